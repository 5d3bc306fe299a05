use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who a ticket is issued to. May differ from the paying account holder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub ticket_type_id: Uuid,
    #[serde(default)]
    pub ticket_type_name: String,
    pub quantity: u32,
    pub price: Decimal,
}

impl LineItem {
    pub fn subtotal(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// What was paid for. Persisted on the payment at initiation and attached to
/// the processor checkout as metadata, which the processor echoes back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    pub event_id: Uuid,
    pub attendee_data: Attendee,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<Attendee>,
    pub ticket_details: Vec<LineItem>,
}

impl OrderDetails {
    /// Attendee for the n-th minted ticket, cycling through group attendees.
    pub fn attendee_for(&self, index: usize) -> &Attendee {
        if self.attendees.is_empty() {
            &self.attendee_data
        } else {
            &self.attendees[index % self.attendees.len()]
        }
    }

    pub fn total(&self) -> Decimal {
        self.ticket_details.iter().map(LineItem::subtotal).sum()
    }

    pub fn total_quantity(&self) -> u64 {
        self.ticket_details
            .iter()
            .map(|item| u64::from(item.quantity))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attendee(name: &str) -> Attendee {
        Attendee {
            full_name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            phone: String::new(),
        }
    }

    #[test]
    fn test_attendee_cycling() {
        let order = OrderDetails {
            event_id: Uuid::new_v4(),
            attendee_data: attendee("Primary"),
            attendees: vec![attendee("Ada"), attendee("Bayo")],
            ticket_details: vec![],
        };

        assert_eq!(order.attendee_for(0).full_name, "Ada");
        assert_eq!(order.attendee_for(1).full_name, "Bayo");
        assert_eq!(order.attendee_for(2).full_name, "Ada");
    }

    #[test]
    fn test_primary_attendee_without_group() {
        let order = OrderDetails {
            event_id: Uuid::new_v4(),
            attendee_data: attendee("Primary"),
            attendees: vec![],
            ticket_details: vec![],
        };
        assert_eq!(order.attendee_for(5).full_name, "Primary");
    }

    #[test]
    fn test_decodes_provider_metadata_shape() {
        let event_id = Uuid::new_v4();
        let ticket_type_id = Uuid::new_v4();
        let raw = serde_json::json!({
            "eventId": event_id,
            "eventTitle": "Lagos Jazz Night",
            "attendeeData": {"fullName": "Ada Obi", "email": "ada@example.com", "phone": "0800"},
            "ticketDetails": [
                {"ticketTypeId": ticket_type_id, "ticketTypeName": "VIP", "quantity": 2, "price": 5000.5}
            ]
        });

        let order: OrderDetails = serde_json::from_value(raw).unwrap();
        assert_eq!(order.event_id, event_id);
        assert_eq!(order.ticket_details[0].quantity, 2);
        assert_eq!(order.total(), Decimal::new(100010, 1));
        assert_eq!(order.total_quantity(), 2);
    }

    #[test]
    fn test_rejects_negative_quantity() {
        let raw = serde_json::json!({
            "eventId": Uuid::new_v4(),
            "attendeeData": {"fullName": "Ada", "email": "ada@example.com"},
            "ticketDetails": [
                {"ticketTypeId": Uuid::new_v4(), "quantity": -1, "price": 10}
            ]
        });
        assert!(serde_json::from_value::<OrderDetails>(raw).is_err());
    }
}
