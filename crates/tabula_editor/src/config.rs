//! Editor configuration.
//!
//! Presentation and behavior knobs for one editor instance. All
//! fields default sensibly, so hosts can deserialize partial
//! configuration and override the rest.

use serde::{Deserialize, Serialize};

/// Behavior and presentation knobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    // Behavior
    /// Never accept input; draw passes show labels only.
    pub read_only: bool,
    /// Commit a field as soon as the user finishes editing it,
    /// instead of waiting for an explicit apply.
    pub auto_commit: bool,

    // Presentation
    /// Annotate each field with its type.
    pub show_types: bool,
    /// Show every subtable expanded regardless of per-node state.
    pub expand_all: bool,
    pub ui_size: f32,
    pub ui_spacing: f32,
    /// Minimum width reserved for empty edit fields.
    pub blank_field_width: f32,

    // Identity
    /// Root of every field id in the traversal tree.
    pub root_id: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            // Behavior
            read_only: false,
            auto_commit: true,

            // Presentation
            show_types: false,
            expand_all: false,
            ui_size: 20.0,
            ui_spacing: 4.0,
            blank_field_width: 100.0,

            // Identity
            root_id: "record".to_string(),
        }
    }
}
