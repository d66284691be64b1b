//! Shared primitive types used across the pipeline.

/// Quarter tag marking an ingestion batch, e.g. "2024-Q4".
pub type Quarter = String;

/// Determination text the extract uses when the provider's offer prevails.
pub const PROVIDER_WIN_OUTCOME: &str = "In Favor of Provider/Facility/AA Provider";

/// Coarse classification of a payment-determination outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeClass {
    FavorProvider,
    FavorPayer,
    Other,
}

impl OutcomeClass {
    pub fn classify(raw: &str) -> Self {
        if raw == PROVIDER_WIN_OUTCOME {
            Self::FavorProvider
        } else if raw.starts_with("In Favor of Health Plan") {
            Self::FavorPayer
        } else {
            Self::Other
        }
    }
}
