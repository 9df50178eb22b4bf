pub mod booking;
pub mod party;
pub mod payment;
pub mod request;

pub use booking::{Assignment, Booking, BookingAction, BookingPaymentStatus, BookingStatus, NewBooking};
pub use party::{Actor, Availability, Customer, Patient, Provider, Role, Service};
pub use payment::{Payment, PaymentMethod, PaymentStatus, PaymentTiming};
pub use request::{
    CatalogAction, CatalogRequest, RejectionRequest, RequestStatus, Requester, Review, Reviewable,
    Verdict,
};
