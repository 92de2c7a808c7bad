use uuid::Uuid;

use crate::store::StoreError;
use crate::domain::order::OrderStatus;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Delivery not found: {0}")]
    NotFound(Uuid),

    #[error("No delivery for order {0}")]
    NoDeliveryForOrder(Uuid),

    #[error("{0}")]
    Forbidden(String),

    #[error("Coordinates out of range: lat {latitude}, lon {longitude}")]
    InvalidCoordinates { latitude: f64, longitude: f64 },

    #[error("Delivery {0} is already delivered")]
    AlreadyDelivered(Uuid),

    #[error("Order {order_id} is {status}, its delivery is closed")]
    OrderClosed { order_id: Uuid, status: OrderStatus },

    #[error("Delivery {0} was modified concurrently")]
    ConcurrentUpdate(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}
