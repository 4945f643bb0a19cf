mod catalog;
mod ids;
mod progress;
mod question;
mod stats;

pub use catalog::{Catalog, CatalogError};
pub use ids::QuestionId;
pub use progress::Progress;
pub use question::{Question, QuestionDraft, QuestionError};
pub use stats::{QuestionStats, StatsError};
