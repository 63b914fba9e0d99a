/// Application interaction modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Moving the selection over outline rows.
    #[default]
    Normal,
    /// Editing the selected node's text.
    Insert,
    /// Command prompt (`:` prefix).
    Command,
    /// Name prompt for a new page.
    PageName,
    /// Fuzzy page picker overlay.
    PagePicker,
    /// Selection lives in the backlinks panel.
    Backlinks,
    /// Waiting for pasted JSON to import.
    ImportPaste,
    ConfirmDeletePage,
}

impl Mode {
    pub fn label(&self) -> &'static str {
        match self {
            Mode::Normal => "NORMAL",
            Mode::Insert => "INSERT",
            Mode::Command => "COMMAND",
            Mode::PageName => "NEW PAGE",
            Mode::PagePicker => "PAGES",
            Mode::Backlinks => "LINKS",
            Mode::ImportPaste => "PASTE",
            Mode::ConfirmDeletePage => "DELETE",
        }
    }
}
