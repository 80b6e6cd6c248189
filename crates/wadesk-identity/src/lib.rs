pub mod address;
pub mod resolver;

pub use address::AddressKind;
pub use resolver::{resolve, resolve_phone_number, PhoneNumber, Resolution, Stage};
