use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Shared Models - Users and Products
// ============================================================================
//
// Orders and deliveries live under `domain/`; these are the entities the
// lifecycle reads but does not own.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Seller,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Seller => "seller",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Role::Customer),
            "seller" => Ok(Role::Seller),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// A registered account. Deactivation is a soft flag; rows are never deleted.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub active: bool,
    #[serde(skip_serializing)]
    pub push_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            role,
            phone: None,
            address: None,
            active: true,
            push_token: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_push_token(mut self, token: impl Into<String>) -> Self {
        self.push_token = Some(token.into());
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_seller(&self) -> bool {
        self.role == Role::Seller
    }
}

/// Catalog entry. `stock` is only mutated through the order store.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub stock: i32,
    pub image_ref: Option<String>,
    pub category: String,
    pub active: bool,
}

impl Product {
    pub fn new(name: impl Into<String>, price: Decimal, stock: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            price,
            stock,
            image_ref: None,
            category: "agua".to_string(),
            active: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_str() {
        for role in [Role::Customer, Role::Seller, Role::Admin] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("courier".parse::<Role>().is_err());
    }

    #[test]
    fn test_push_token_not_serialized() {
        let user = User::new("Ana", "ana@example.com", Role::Customer).with_push_token("tok");
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("push_token").is_none());
        assert_eq!(json["role"], "customer");
    }
}
