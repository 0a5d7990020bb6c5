//! Style targets
//!
//! The element surface runtime objects write to: custom properties for
//! mirrored motion values, and generated animation rules for layout
//! transitions. Hosts implement [`StyleTarget`] over their element type.

use std::cell::RefCell;

use indexmap::IndexMap;

/// A styleable element
pub trait StyleTarget {
    /// Set an inline property (including `--custom` properties)
    fn set_property(&self, name: &str, value: &str);

    fn remove_property(&self, name: &str);

    /// Install `css` and apply `class_name` to the element
    fn apply_animation(&self, class_name: &str, css: &str);
}

/// One call received by a [`RecordingStyleTarget`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StyleWrite {
    Set { name: String, value: String },
    Remove { name: String },
    Animate { class_name: String, css: String },
}

/// In-memory style target for headless use
///
/// Keeps the current inline properties plus a log of every write.
#[derive(Debug, Default)]
pub struct RecordingStyleTarget {
    properties: RefCell<IndexMap<String, String>>,
    writes: RefCell<Vec<StyleWrite>>,
}

impl RecordingStyleTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of an inline property
    pub fn property(&self, name: &str) -> Option<String> {
        self.properties.borrow().get(name).cloned()
    }

    pub fn writes(&self) -> Vec<StyleWrite> {
        self.writes.borrow().clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.borrow().len()
    }

    /// Class names applied so far, oldest first
    pub fn applied_classes(&self) -> Vec<String> {
        self.writes
            .borrow()
            .iter()
            .filter_map(|w| match w {
                StyleWrite::Animate { class_name, .. } => Some(class_name.clone()),
                _ => None,
            })
            .collect()
    }
}

impl StyleTarget for RecordingStyleTarget {
    fn set_property(&self, name: &str, value: &str) {
        self.properties
            .borrow_mut()
            .insert(name.to_string(), value.to_string());
        self.writes.borrow_mut().push(StyleWrite::Set {
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    fn remove_property(&self, name: &str) {
        self.properties.borrow_mut().shift_remove(name);
        self.writes.borrow_mut().push(StyleWrite::Remove {
            name: name.to_string(),
        });
    }

    fn apply_animation(&self, class_name: &str, css: &str) {
        self.writes.borrow_mut().push(StyleWrite::Animate {
            class_name: class_name.to_string(),
            css: css.to_string(),
        });
    }
}
