// Stores
pub mod catalog;
pub mod orders;

// Payment link signing and verification
pub mod payments;

// Orchestration across stores, payments, CRM and chat
pub mod checkout;

pub use catalog::CatalogService;
pub use checkout::{CheckoutDraft, CheckoutService, ConfirmationOutcome, FinalizeOutcome};
pub use orders::{AdmissionOutcome, NewOrder, OrderService, PaymentConfirmation};
pub use payments::PaymentLinkService;
