use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::app::AppContext;
use crate::error::Result;
use crate::http::{RouteModule, ValidatedJson, ValidatedQuery};
use crate::payments::SaveCard;
use crate::store::CardSummary;

pub struct CardRoutes;

impl RouteModule for CardRoutes {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/api/cards", get(list_cards))
            .route("/api/cards/create", post(create_card))
            .route("/api/cards/{card_id}", delete(delete_card))
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCardBody {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    /// Single-use card token from the Web Payments SDK.
    #[serde(default, alias = "source_id")]
    pub nonce: Option<String>,
    #[serde(default)]
    #[validate(length(max = 255, message = "must be at most 255 characters"))]
    pub cardholder_name: Option<String>,
    #[serde(default, alias = "postal_code")]
    #[validate(length(max = 20, message = "must be at most 20 characters"))]
    pub billing_postal_code: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct OwnerQuery {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CardListResponse {
    pub cards: Vec<CardSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteCardResponse {
    pub message: String,
}

async fn create_card(
    State(ctx): State<AppContext>,
    ValidatedJson(body): ValidatedJson<CreateCardBody>,
) -> Result<Json<CardSummary>> {
    let record = ctx
        .cards()
        .save_card(SaveCard {
            user_id: body.user_id.unwrap_or_default(),
            customer_id: body.customer_id.unwrap_or_default(),
            nonce: body.nonce.unwrap_or_default(),
            cardholder_name: body.cardholder_name,
            billing_postal_code: body.billing_postal_code,
        })
        .await?;

    Ok(Json(record.summary()))
}

async fn list_cards(
    State(ctx): State<AppContext>,
    ValidatedQuery(query): ValidatedQuery<OwnerQuery>,
) -> Result<Json<CardListResponse>> {
    let cards = ctx.cards().list_cards(query.user_id.as_deref()).await?;
    Ok(Json(CardListResponse { cards }))
}

async fn delete_card(
    State(ctx): State<AppContext>,
    Path(card_id): Path<String>,
    ValidatedQuery(query): ValidatedQuery<OwnerQuery>,
) -> Result<Json<DeleteCardResponse>> {
    ctx.cards()
        .delete_card(query.user_id.as_deref(), &card_id)
        .await?;

    Ok(Json(DeleteCardResponse {
        message: "Card deleted".to_string(),
    }))
}
