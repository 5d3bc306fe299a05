pub mod event;
pub mod fulfillment;
pub mod order;
pub mod payment;
pub mod requests;
pub mod ticket;

pub use event::Event;
pub use fulfillment::{FulfillmentLine, LineSettlement, LineStatus, NewFulfillmentLine};
pub use order::{Attendee, LineItem, OrderDetails};
pub use payment::{
    NewPayment, PaymentMethod, PaymentRecord, PaymentStatus, StatusChange, TransitionError,
};
pub use ticket::{NewTicket, Ticket, TicketType};
