pub mod loader;
pub mod schema;

pub use loader::{CampaignData, DataLoadError, load_campaign};
