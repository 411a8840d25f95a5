use tracing::info;

/// Document-level progress. The only transition is
/// `Translating -> PassThrough`, taken when the references title is seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentState {
    #[default]
    Translating,
    PassThrough,
}

impl DocumentState {
    pub fn is_translating(&self) -> bool {
        matches!(self, DocumentState::Translating)
    }

    /// Feeds the recognised text of a title region. Returns true when this
    /// call moved the document into pass-through.
    pub fn observe_title(&mut self, title: Option<&str>) -> bool {
        if !self.is_translating() {
            return false;
        }
        let Some(title) = title else {
            return false;
        };
        if is_references_marker(title) {
            info!("references section reached; remaining content passes through");
            *self = DocumentState::PassThrough;
            return true;
        }
        false
    }
}

pub fn is_references_marker(title: &str) -> bool {
    let normalized = title.trim().to_lowercase();
    normalized == "references" || normalized == "reference"
}
