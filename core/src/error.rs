/// Outcomes a caller can recover from, plus backend failures.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// A required recipe field is missing, blank, or malformed.
    #[error("{0}")]
    Validation(String),

    #[error("Recipe {0} not found")]
    NotFound(String),

    #[error("Invalid day '{0}'. Use a weekday name such as Monday")]
    InvalidDay(String),

    #[error("Recipe {recipe_id} is not assigned to {day}")]
    NotAssigned { day: String, recipe_id: String },

    /// Assignment target does not exist in the user's recipe store.
    #[error("Recipe {0} not found")]
    RecipeNotFound(String),

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl PlanError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True for the variants that mean "nothing there to act on".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::RecipeNotFound(_) | Self::NotAssigned { .. }
        )
    }
}

pub type PlanResult<T> = std::result::Result<T, PlanError>;
