pub mod dispatcher;
pub mod email;
pub mod push;
pub mod templates;

pub use dispatcher::{DispatchOutcome, NotificationDispatcher, NotificationKind};
pub use email::{EmailError, LogMailer, Mailer, SmtpMailer};
pub use push::{FcmPushSender, LogPushSender, PushError, PushMessage, PushSender};
