pub mod account;

pub use account::{AccountContext, ACCOUNT_EMAIL_HEADER, ACCOUNT_ID_HEADER};
