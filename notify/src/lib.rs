//! Notify - learner notifications over SMS and email
//!
//! - [`Notification`] - the message catalogue and its SMS/email rendering
//! - [`SmsSender`] / [`EmailSender`] - provider seams (Africa's Talking, SendGrid)
//! - [`Dispatcher`] - resolves a user's contact details and fans out to
//!   every configured channel
//!
//! Delivery is best-effort: failures are logged and reported in a
//! [`DeliveryReport`], never returned as errors to the business operation
//! that triggered them.

pub mod dispatcher;
pub mod email;
pub mod error;
pub mod mock;
pub mod phone;
pub mod sms;
pub mod template;

pub use dispatcher::{
    Contact, ContactDirectory, Delivery, DeliveryReport, Dispatcher, NotificationSink,
};
pub use email::{EmailMessage, EmailSender, SendGridConfig, SendGridEmail};
pub use error::NotifyError;
pub use mock::{InMemoryContacts, RecordingSink};
pub use phone::format_ug_phone;
pub use sms::{AfricasTalkingConfig, AfricasTalkingSms, SmsReceipt, SmsSender};
pub use template::Notification;
