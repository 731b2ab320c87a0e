use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -------- REQUEST DTOs --------
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String, // Plain text
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub code: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ResendCodeRequest {
    pub email: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String, // Plain text
}

/// Sent by the payment service once an order is paid.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ReceiptRequest {
    pub user_id: Uuid,
    pub order_id: String,
    pub amount: f64,
    pub item_name: String,
}
