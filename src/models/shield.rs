//! A user-defined, single-step BLOCK/ALLOW policy over arbitrary text,
//! independent of the main pipeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shield {
    pub id: Uuid,
    pub shield_key: String,
    pub owner_id: String,
    pub prompt_description: String,
    pub what_to_block: String,
    pub what_not_to_block: String,
    pub is_active: bool,
}

impl Shield {
    pub fn new(
        shield_key: impl Into<String>,
        owner_id: impl Into<String>,
        prompt_description: impl Into<String>,
        what_to_block: impl Into<String>,
        what_not_to_block: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            shield_key: shield_key.into(),
            owner_id: owner_id.into(),
            prompt_description: prompt_description.into(),
            what_to_block: what_to_block.into(),
            what_not_to_block: what_not_to_block.into(),
            is_active: true,
        }
    }
}
