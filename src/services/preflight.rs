//! Pre-export save coordination.
//!
//! Before an export touches any files, every unit of editable state with unsaved changes must
//! be written to disk: open documents, an active sub-editor (such as a prefab stage) and dirty
//! persisted assets. The user may cancel at either prompt, which stops the export without
//! treating it as an error.
//!
//! Items still dirty after saving are governed by [`ResidualPolicy`]. The default is
//! [`ResidualPolicy::Warn`]: only an explicit cancellation fails the commit.

use crate::host::{PromptChoice, UnsavedResourceEnumerator};
use anyhow::{Context, Result};
use indexmap::IndexSet;
use std::sync::Arc;

/// Only assets under this prefix belong to the project's asset graph
pub const ASSET_ROOT_PREFIX: &str = "Assets/";

/// What to do with items that are still dirty after a successful save
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResidualPolicy {
    /// Log a warning and proceed
    #[default]
    Warn,
    /// Refuse to proceed
    Fail,
}

/// Where the user cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelPoint {
    Documents,
    SubEditor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreflightOutcome {
    /// Everything was saved; `residual` lists items still reported dirty afterwards
    Committed { residual: Vec<String> },
    Cancelled { at: CancelPoint },
    /// Saved, but items remain dirty and the policy is [`ResidualPolicy::Fail`]
    ResidualDirty { items: Vec<String> },
}

impl PreflightOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

pub struct PreflightCoordinator {
    resources: Arc<dyn UnsavedResourceEnumerator>,
    policy: ResidualPolicy,
}

impl PreflightCoordinator {
    pub fn new(resources: Arc<dyn UnsavedResourceEnumerator>) -> Self {
        Self {
            resources,
            policy: ResidualPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ResidualPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> ResidualPolicy {
        self.policy
    }

    /// Describe everything with unsaved modifications, one label per item
    ///
    /// Documents are listed by path, or by name with an "(unsaved)" suffix when they were
    /// never saved. Dirty assets outside the asset root are ignored.
    pub fn unsaved_items(&self) -> Vec<String> {
        let mut items: IndexSet<String> = IndexSet::new();

        for document in self.resources.dirty_documents() {
            let label = match document.path.as_deref() {
                Some(path) if !path.is_empty() => path.to_string(),
                _ => format!("{} (unsaved)", document.name),
            };
            items.insert(label);
        }

        if let Some(context) = self.resources.active_sub_editor() {
            if context.is_dirty {
                let path = context.asset_path.as_deref().unwrap_or("(unknown)");
                items.insert(format!("Sub-editor: {}", path));
            }
        }

        for asset in self.resources.dirty_assets() {
            if asset.starts_with(ASSET_ROOT_PREFIX) {
                items.insert(asset);
            }
        }

        items.into_iter().collect()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        !self.unsaved_items().is_empty()
    }

    /// Commit every pending edit to durable storage
    ///
    /// Returns `Err` only when a save itself fails. Cancellation is reported as
    /// [`PreflightOutcome::Cancelled`] and nothing after the cancelled prompt runs.
    pub fn commit_pending_changes(&self) -> Result<PreflightOutcome> {
        if !self.resources.dirty_documents().is_empty()
            && !self.resources.save_documents_with_prompt()
        {
            tracing::info!("Save cancelled at the document prompt");
            return Ok(PreflightOutcome::Cancelled {
                at: CancelPoint::Documents,
            });
        }

        if let Some(context) = self.resources.active_sub_editor() {
            if context.is_dirty {
                match self.resources.prompt_sub_editor_save(&context) {
                    PromptChoice::Cancel => {
                        tracing::info!("Save cancelled at the sub-editor prompt");
                        return Ok(PreflightOutcome::Cancelled {
                            at: CancelPoint::SubEditor,
                        });
                    }
                    PromptChoice::Save => {
                        self.resources.save_sub_editor(&context).with_context(|| {
                            format!(
                                "Failed to save sub-editor {}",
                                context.asset_path.as_deref().unwrap_or("(unknown)")
                            )
                        })?;
                    }
                }
            }
        }

        self.resources
            .persist_dirty_assets()
            .context("Failed to save dirty assets")?;

        let residual = self.unsaved_items();
        if residual.is_empty() {
            tracing::info!("All pending changes saved");
            return Ok(PreflightOutcome::Committed { residual });
        }

        tracing::warn!(
            "{} item(s) still report unsaved changes: {}",
            residual.len(),
            residual.join(", ")
        );

        Ok(match self.policy {
            ResidualPolicy::Warn => PreflightOutcome::Committed { residual },
            ResidualPolicy::Fail => PreflightOutcome::ResidualDirty { items: residual },
        })
    }
}
