//! Acknowledgement checklist gating the funding and swap actions.

use serde::Serialize;

/// One checklist item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AckItem {
    pub name: String,
    pub acknowledged: bool,
}

/// The set of user acknowledgements. Order follows the page.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AckPrompt {
    items: Vec<AckItem>,
}

impl AckPrompt {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut items: Vec<AckItem> = Vec::new();
        for name in names {
            let name = name.into();
            if items.iter().any(|i| i.name == name) {
                continue;
            }
            items.push(AckItem {
                name,
                acknowledged: false,
            });
        }
        Self { items }
    }

    /// Mark an item as acknowledged. Returns false if the item is unknown.
    pub fn acknowledge(&mut self, name: &str) -> bool {
        match self.items.iter_mut().find(|i| i.name == name) {
            Some(item) => {
                item.acknowledged = true;
                true
            }
            None => false,
        }
    }

    /// Whether every item has been acknowledged. Vacuously true when empty.
    pub fn all_acknowledged(&self) -> bool {
        self.items.iter().all(|i| i.acknowledged)
    }

    pub fn pending(&self) -> usize {
        self.items.iter().filter(|i| !i.acknowledged).count()
    }

    pub fn items(&self) -> &[AckItem] {
        &self.items
    }

    pub fn clear(&mut self) {
        for item in &mut self.items {
            item.acknowledged = false;
        }
    }
}
