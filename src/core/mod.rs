pub mod errors;
pub mod models;
pub mod pipeline;

pub use errors::DecantError;
pub use models::{ Card, CardOrigin, CardSides, FieldSide, SourceDeck, SourceModel, SourceNote };
