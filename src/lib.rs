pub mod amount;
pub mod api;
pub mod composer;
pub mod config;
pub mod csv;
pub mod draft;
pub mod import;
pub mod model;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use amount::Amount;
pub use api::AdminApi;
pub use composer::{OrderComposer, SubmitError};
pub use config::Config;
pub use draft::{DraftAction, OrderDraft};
pub use session::{SessionClient, SessionEvent};
