use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::order::{Order, OrderStatus};
use crate::models::User;

// ============================================================================
// Order Notifications - what happened, and how it reads to each audience
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    OrderCreated,
    OrderAssigned,
    OrderStatusChanged,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::OrderCreated => "order_created",
            NotificationKind::OrderAssigned => "order_assigned",
            NotificationKind::OrderStatusChanged => "order_status_changed",
        }
    }
}

/// An order event together with the people it concerns.
#[derive(Debug, Clone)]
pub enum OrderNotification {
    Created { order: Order, customer: User },
    Assigned { order: Order, seller: User },
    StatusChanged { order: Order, customer: User, previous: OrderStatus },
}

impl OrderNotification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            OrderNotification::Created { .. } => NotificationKind::OrderCreated,
            OrderNotification::Assigned { .. } => NotificationKind::OrderAssigned,
            OrderNotification::StatusChanged { .. } => NotificationKind::OrderStatusChanged,
        }
    }

    pub fn order(&self) -> &Order {
        match self {
            OrderNotification::Created { order, .. }
            | OrderNotification::Assigned { order, .. }
            | OrderNotification::StatusChanged { order, .. } => order,
        }
    }

    /// Key/value payload attached to push messages.
    pub fn push_data(&self) -> HashMap<String, String> {
        let order = self.order();
        HashMap::from([
            ("event".to_string(), self.kind().as_str().to_string()),
            ("order_id".to_string(), order.id.to_string()),
            ("status".to_string(), order.status.as_str().to_string()),
        ])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    pub title: String,
    pub body: String,
}

pub fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..8].to_uppercase()
}

/// Where the customer can be reached by phone: the order's contact number
/// first, then the profile.
pub fn customer_phone<'a>(order: &'a Order, customer: &'a User) -> Option<&'a str> {
    order
        .contact_phone
        .as_deref()
        .or(customer.phone.as_deref())
        .filter(|p| !p.trim().is_empty())
}

pub fn admin_summary(order: &Order, customer: &User) -> RenderedMessage {
    let mut body = format!(
        "Nuevo pedido #{}\nCliente: {}\nTotal: ${:.2}\nDirección: {}\nPago: {}",
        short_id(order.id),
        customer.name,
        order.total,
        order.delivery_address,
        order.payment_method.label(),
    );
    for item in &order.items {
        body.push_str(&format!("\n- {} x{}", item.product_name, item.quantity));
    }
    if let Some(notes) = &order.notes {
        body.push_str(&format!("\nNotas: {}", notes));
    }

    RenderedMessage {
        title: format!("Nuevo pedido #{} - ${:.2}", short_id(order.id), order.total),
        body,
    }
}

pub fn customer_confirmation(order: &Order, customer: &User) -> RenderedMessage {
    RenderedMessage {
        title: "Pedido recibido".to_string(),
        body: format!(
            "Hola {}, recibimos tu pedido #{} por ${:.2}. Te avisaremos cuando esté en camino.",
            customer.name,
            short_id(order.id),
            order.total,
        ),
    }
}

pub fn seller_assignment(order: &Order) -> RenderedMessage {
    RenderedMessage {
        title: "Nuevo pedido asignado".to_string(),
        body: format!(
            "Pedido #{} por ${:.2} - {}",
            short_id(order.id),
            order.total,
            order.delivery_address,
        ),
    }
}

pub fn status_update(order: &Order, customer: &User, previous: OrderStatus) -> RenderedMessage {
    RenderedMessage {
        title: format!("Tu pedido está: {}", order.status.label()),
        body: format!(
            "Hola {}, tu pedido #{} pasó de {} a {}.",
            customer.name,
            short_id(order.id),
            previous.label(),
            order.status.label(),
        ),
    }
}
