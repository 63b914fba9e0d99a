use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

use crate::clipboard::Clipboard;
use crate::command::{self, BulletModifier, Outcome, UiEvent};
use crate::error::ImportError;
use crate::model::config::{self, AppConfig};
use crate::model::links::{self, Backlinks, LinkRecord, LinkTarget, LinkToken};
use crate::model::mode::Mode;
use crate::model::outline::Node;
use crate::model::tree;
use crate::msg::Msg;
use crate::storage;
use crate::workspace::Workspace;

const PENDING_KEY_TIMEOUT: Duration = Duration::from_millis(800);
const NOTIFICATION_TTL: Duration = Duration::from_secs(4);
const PLACEHOLDER: &str = "Type here...";

/// One visible outline line: a node and how deep it sits under the scope root.
#[derive(Debug, Clone)]
struct Row {
    node_id: String,
    depth: usize,
    content: String,
    has_children: bool,
    collapsed: bool,
}

#[derive(Debug, Clone)]
struct PickerResult {
    page_id: String,
    name: String,
}

/// In-progress edit of one node. `cursor` is a byte offset on a char boundary.
#[derive(Debug, Clone)]
struct LineEditor {
    node_id: String,
    text: String,
    cursor: usize,
}

impl LineEditor {
    fn new(node_id: String, text: String) -> Self {
        let cursor = text.len();
        Self {
            node_id,
            text,
            cursor,
        }
    }

    fn insert(&mut self, ch: char) {
        self.text.insert(self.cursor, ch);
        self.cursor += ch.len_utf8();
    }

    fn insert_str(&mut self, s: &str) {
        self.text.insert_str(self.cursor, s);
        self.cursor += s.len();
    }

    fn backspace(&mut self) -> bool {
        let Some(ch) = self.text[..self.cursor].chars().next_back() else {
            return false;
        };
        self.cursor -= ch.len_utf8();
        self.text.remove(self.cursor);
        true
    }

    fn delete(&mut self) -> bool {
        if self.cursor >= self.text.len() {
            return false;
        }
        self.text.remove(self.cursor);
        true
    }

    fn left(&mut self) {
        if let Some(ch) = self.text[..self.cursor].chars().next_back() {
            self.cursor -= ch.len_utf8();
        }
    }

    fn right(&mut self) {
        if let Some(ch) = self.text[self.cursor..].chars().next() {
            self.cursor += ch.len_utf8();
        }
    }
}

#[derive(Default)]
struct RenderCache {
    rows: Vec<Row>,
    backlinks: Backlinks,
    top: usize,
    dirty: bool,
}

pub struct App {
    pub mode: Mode,
    pub config: AppConfig,
    pub should_quit: bool,
    pub notifications: VecDeque<String>,
    workspace: Workspace,
    event_tx: mpsc::Sender<Msg>,
    clipboard: Box<dyn Clipboard>,
    notification_until: Option<Instant>,
    cache: RenderCache,
    selected: usize,
    editor: Option<LineEditor>,
    prompt_input: String,
    picker_query: String,
    picker_results: Vec<PickerResult>,
    picker_selected: usize,
    pending_key: Option<(char, Instant)>,
    backlinks_visible: bool,
    backlinks_selected: usize,
}

impl App {
    pub fn new(
        config: AppConfig,
        workspace: Workspace,
        event_tx: mpsc::Sender<Msg>,
        clipboard: Box<dyn Clipboard>,
    ) -> Self {
        let backlinks_visible = config.outline.show_backlinks;
        let mut app = Self {
            mode: Mode::Normal,
            config,
            should_quit: false,
            notifications: VecDeque::new(),
            workspace,
            event_tx,
            clipboard,
            notification_until: None,
            cache: RenderCache::default(),
            selected: 0,
            editor: None,
            prompt_input: String::new(),
            picker_query: String::new(),
            picker_results: Vec::new(),
            picker_selected: 0,
            pending_key: None,
            backlinks_visible,
            backlinks_selected: 0,
        };
        app.refresh();
        app
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    // ── MVU: Update ──────────────────────────────────────────────

    pub fn update(&mut self, msg: Msg) -> Result<()> {
        match msg {
            Msg::Key(key) => self.handle_key(key)?,
            Msg::Paste(text) => self.handle_paste(text),
            Msg::Resize(..) | Msg::Redraw => self.mark_render_dirty(),
            Msg::Notify(message) => self.push_notification(message),
            Msg::ImportLoaded { path, result } => match result {
                Ok(text) => {
                    if self.apply(UiEvent::Import(text)) == Outcome::Changed {
                        self.selected = 0;
                        self.push_notification(format!("imported {}", path.display()));
                    }
                }
                Err(e) => {
                    tracing::warn!("import read of {} failed: {e}", path.display());
                    self.push_notification(ImportError::Read(e).to_string());
                }
            },
            Msg::ExportFinished { path, result } => match result {
                Ok(()) => self.push_notification(format!("exported to {}", path.display())),
                Err(e) => self.push_notification(format!("export failed: {e}")),
            },
            Msg::Tick => self.handle_tick(),
        }
        Ok(())
    }

    fn handle_tick(&mut self) {
        let now = Instant::now();
        if self
            .pending_key
            .is_some_and(|(_, since)| now.duration_since(since) > PENDING_KEY_TIMEOUT)
        {
            self.pending_key = None;
        }
        if self.notification_until.is_some_and(|until| now >= until) {
            self.notification_until = None;
        }
    }

    fn push_notification(&mut self, message: String) {
        self.notifications.push_back(message);
        while self.notifications.len() > self.config.general.max_notifications.max(1) {
            self.notifications.pop_front();
        }
        self.notification_until = Some(Instant::now() + NOTIFICATION_TTL);
    }

    fn mark_render_dirty(&mut self) {
        self.cache.dirty = true;
    }

    /// Route a UI event through the dispatch table and resync the view.
    fn apply(&mut self, event: UiEvent) -> Outcome {
        let outcome = command::dispatch(&mut self.workspace, event);
        self.refresh();

        match &outcome {
            Outcome::Select(id) => {
                self.select_node(id);
            }
            Outcome::Copy(text) => self.copy_to_clipboard(text),
            Outcome::Declined(reason) => self.push_notification(reason.clone()),
            Outcome::Changed | Outcome::Unchanged => {}
        }
        outcome
    }

    /// Rebuild rows and backlinks from the workspace, keeping the selected
    /// node selected when it is still visible.
    fn refresh(&mut self) {
        let selected_id = self.selected_node_id().map(str::to_owned);

        let mut rows = Vec::new();
        flatten(self.workspace.visible_nodes(), 0, &mut rows);
        self.cache.rows = rows;

        let page_id = self.workspace.current_page().map(|p| p.id.clone());
        self.cache.backlinks = page_id
            .map(|id| self.workspace.backlinks(&id))
            .unwrap_or_default();
        self.backlinks_selected = self
            .backlinks_selected
            .min(self.cache.backlinks.len().saturating_sub(1));

        if let Some(idx) = selected_id.and_then(|id| self.row_index(&id)) {
            self.selected = idx;
        }
        self.selected = self.selected.min(self.cache.rows.len().saturating_sub(1));

        let editor_gone = self
            .editor
            .as_ref()
            .is_some_and(|e| self.row_index(&e.node_id).is_none());
        if editor_gone {
            self.editor = None;
            if self.mode == Mode::Insert {
                self.mode = Mode::Normal;
            }
        }

        self.cache.dirty = false;
    }

    fn row_index(&self, node_id: &str) -> Option<usize> {
        self.cache.rows.iter().position(|r| r.node_id == node_id)
    }

    fn selected_node_id(&self) -> Option<&str> {
        self.cache.rows.get(self.selected).map(|r| r.node_id.as_str())
    }

    fn select_node(&mut self, node_id: &str) -> bool {
        match self.row_index(node_id) {
            Some(idx) => {
                self.selected = idx;
                true
            }
            None => false,
        }
    }

    fn move_selection(&mut self, delta: isize) {
        let last = self.cache.rows.len().saturating_sub(1);
        self.selected = self.selected.saturating_add_signed(delta).min(last);
    }

    // ── Keys ─────────────────────────────────────────────────────

    fn handle_key(&mut self, key: KeyEvent) -> Result<()> {
        match self.mode {
            Mode::Normal => self.handle_key_normal(key),
            Mode::Insert => self.handle_key_insert(key),
            Mode::Command | Mode::PageName => self.handle_key_prompt(key),
            Mode::PagePicker => self.handle_key_picker(key),
            Mode::Backlinks => self.handle_key_backlinks(key),
            Mode::ImportPaste => {
                if key.code == KeyCode::Esc {
                    self.mode = Mode::Normal;
                    self.push_notification("import cancelled".to_string());
                }
            }
            Mode::ConfirmDeletePage => self.handle_key_confirm_delete(key),
        }
        Ok(())
    }

    fn handle_key_normal(&mut self, key: KeyEvent) {
        if let Some((pending, _)) = self.pending_key.take() {
            match (pending, key.code) {
                ('g', KeyCode::Char('d')) => return self.follow_link_in_selected(),
                ('z', KeyCode::Char('a')) => {
                    self.click_selected(BulletModifier::Toggle);
                    return;
                }
                _ => {}
            }
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('b') => self.toggle_backlinks_panel(),
                KeyCode::Char('n') => self.switch_page_relative(1),
                KeyCode::Char('p') => self.switch_page_relative(-1),
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Char(ch @ ('g' | 'z')) => {
                self.pending_key = Some((ch, Instant::now()));
            }
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('j') | KeyCode::Down => self.move_selection(1),
            KeyCode::Char('k') | KeyCode::Up => self.move_selection(-1),
            KeyCode::Char('G') => self.selected = self.cache.rows.len().saturating_sub(1),
            KeyCode::Char('i') | KeyCode::Char('a') => self.begin_edit(),
            KeyCode::Enter | KeyCode::Char('l') | KeyCode::Right => {
                if self.cache.rows.is_empty() {
                    self.create_first_node();
                } else if self.click_selected(BulletModifier::None) {
                    self.selected = 0;
                }
            }
            KeyCode::Char(' ') => {
                self.click_selected(BulletModifier::Toggle);
            }
            KeyCode::Char('y') => {
                self.click_selected(BulletModifier::Copy);
            }
            KeyCode::Char('h') | KeyCode::Left | KeyCode::Backspace => self.breadcrumb_up(),
            KeyCode::Char('o') => match self.selected_node_id().map(str::to_owned) {
                Some(node_id) => self.create_and_edit(UiEvent::Enter { node_id }),
                None => self.create_first_node(),
            },
            KeyCode::Char('O') => {
                if let Some(node_id) = self.selected_node_id().map(str::to_owned) {
                    self.create_and_edit(UiEvent::CtrlEnter { node_id });
                }
            }
            KeyCode::Char('x') => {
                if let Some(node_id) = self.selected_node_id().map(str::to_owned) {
                    self.apply(UiEvent::Delete { node_id });
                }
            }
            KeyCode::Char('P') => {
                self.prompt_input.clear();
                self.mode = Mode::PageName;
            }
            KeyCode::Char('D') => self.mode = Mode::ConfirmDeletePage,
            KeyCode::Char('/') => self.open_picker(),
            KeyCode::Char(':') => {
                self.prompt_input.clear();
                self.mode = Mode::Command;
            }
            _ => {}
        }
    }

    fn handle_key_insert(&mut self, key: KeyEvent) {
        let Some(node_id) = self.editor.as_ref().map(|e| e.node_id.clone()) else {
            self.mode = Mode::Normal;
            return;
        };
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let alt = key.modifiers.contains(KeyModifiers::ALT);

        match key.code {
            KeyCode::Esc => self.finish_edit(),
            KeyCode::Enter if ctrl || alt => self.create_and_edit(UiEvent::CtrlEnter { node_id }),
            KeyCode::Enter => self.create_and_edit(UiEvent::Enter { node_id }),
            KeyCode::Char('g') if ctrl => self.follow_link_at_cursor(),
            KeyCode::Backspace => {
                let empty = self.editor.as_ref().is_some_and(|e| e.text.is_empty());
                if empty {
                    match self.apply(UiEvent::BackspaceOnEmpty { node_id }) {
                        Outcome::Select(target) => self.edit_node(&target),
                        Outcome::Changed => self.finish_edit(),
                        _ => {}
                    }
                } else if self.editor.as_mut().is_some_and(LineEditor::backspace) {
                    self.sync_edit();
                }
            }
            KeyCode::Delete => {
                if self.editor.as_mut().is_some_and(LineEditor::delete) {
                    self.sync_edit();
                }
            }
            KeyCode::Left => self.with_editor(LineEditor::left),
            KeyCode::Right => self.with_editor(LineEditor::right),
            KeyCode::Home => self.with_editor(|e| e.cursor = 0),
            KeyCode::End => self.with_editor(|e| e.cursor = e.text.len()),
            KeyCode::Up | KeyCode::Down => {
                self.move_selection(if key.code == KeyCode::Up { -1 } else { 1 });
                self.begin_edit();
            }
            KeyCode::Char(ch) if !ctrl => {
                self.with_editor(|e| e.insert(ch));
                self.sync_edit();
            }
            _ => {}
        }
    }

    fn handle_key_prompt(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.mode = Mode::Normal;
                self.prompt_input.clear();
            }
            KeyCode::Enter => {
                let input = std::mem::take(&mut self.prompt_input);
                let mode = std::mem::replace(&mut self.mode, Mode::Normal);
                if mode == Mode::PageName {
                    if self.apply(UiEvent::AddPage(input)) == Outcome::Changed {
                        self.selected = 0;
                    }
                } else {
                    self.run_command(input.trim());
                }
            }
            KeyCode::Backspace => {
                self.prompt_input.pop();
            }
            KeyCode::Char(ch)
                if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT =>
            {
                self.prompt_input.push(ch);
            }
            _ => {}
        }
    }

    fn handle_key_picker(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.close_picker(),
            KeyCode::Enter => {
                let event = match self.picker_results.get(self.picker_selected) {
                    Some(result) => Some(UiEvent::PageTabClick(result.page_id.clone())),
                    None if !self.picker_query.trim().is_empty() => {
                        Some(UiEvent::AddPage(self.picker_query.clone()))
                    }
                    None => None,
                };
                self.close_picker();
                if let Some(event) = event {
                    self.apply(event);
                    self.selected = 0;
                }
            }
            KeyCode::Down => {
                if !self.picker_results.is_empty() {
                    self.picker_selected =
                        (self.picker_selected + 1).min(self.picker_results.len() - 1);
                }
            }
            KeyCode::Up => {
                self.picker_selected = self.picker_selected.saturating_sub(1);
            }
            KeyCode::Backspace => {
                self.picker_query.pop();
                self.refresh_picker_results();
            }
            KeyCode::Char(ch)
                if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT =>
            {
                self.picker_query.push(ch);
                self.refresh_picker_results();
            }
            _ => {}
        }
    }

    fn handle_key_backlinks(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('b') {
            self.toggle_backlinks_panel();
            return;
        }

        match key.code {
            KeyCode::Esc => self.mode = Mode::Normal,
            KeyCode::Char('j') | KeyCode::Down => {
                self.backlinks_selected = (self.backlinks_selected + 1)
                    .min(self.cache.backlinks.len().saturating_sub(1));
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.backlinks_selected = self.backlinks_selected.saturating_sub(1);
            }
            KeyCode::Enter => {
                let Some(record) = self
                    .cache
                    .backlinks
                    .iter()
                    .nth(self.backlinks_selected)
                    .cloned()
                else {
                    return;
                };
                self.mode = Mode::Normal;
                self.apply(UiEvent::BacklinkClick {
                    page_id: record.source_page_id,
                    node_id: record.source_node_id,
                });
            }
            _ => {}
        }
    }

    fn handle_key_confirm_delete(&mut self, key: KeyEvent) {
        self.mode = Mode::Normal;
        if !matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y')) {
            return;
        }
        let Some(page_id) = self.workspace.current_page().map(|p| p.id.clone()) else {
            return;
        };
        if self.apply(UiEvent::DeletePage(page_id)) == Outcome::Changed {
            self.selected = 0;
        }
    }

    fn handle_paste(&mut self, text: String) {
        match self.mode {
            Mode::ImportPaste => {
                self.mode = Mode::Normal;
                if self.apply(UiEvent::Import(text)) == Outcome::Changed {
                    self.selected = 0;
                    self.push_notification("imported pasted data".to_string());
                }
            }
            Mode::Insert => {
                let line = text.replace(['\r', '\n'], " ");
                self.with_editor(|e| e.insert_str(&line));
                self.sync_edit();
            }
            Mode::Command | Mode::PageName => {
                self.prompt_input.push_str(text.lines().next().unwrap_or_default());
            }
            Mode::PagePicker => {
                self.picker_query.push_str(text.lines().next().unwrap_or_default());
                self.refresh_picker_results();
            }
            _ => {}
        }
    }

    // ── Editing ──────────────────────────────────────────────────

    fn begin_edit(&mut self) {
        let Some(row) = self.cache.rows.get(self.selected) else {
            return;
        };
        self.editor = Some(LineEditor::new(row.node_id.clone(), row.content.clone()));
        self.mode = Mode::Insert;
    }

    /// Move the editor to `node_id`, or drop back to normal mode when it is
    /// not on screen.
    fn edit_node(&mut self, node_id: &str) {
        if self.select_node(node_id) {
            self.begin_edit();
        } else {
            self.finish_edit();
        }
    }

    fn finish_edit(&mut self) {
        self.editor = None;
        self.mode = Mode::Normal;
    }

    fn with_editor(&mut self, f: impl FnOnce(&mut LineEditor)) {
        if let Some(editor) = self.editor.as_mut() {
            f(editor);
        }
    }

    fn sync_edit(&mut self) {
        let Some(editor) = &self.editor else {
            return;
        };
        let event = UiEvent::TextEdited {
            node_id: editor.node_id.clone(),
            content: editor.text.clone(),
        };
        self.apply(event);
    }

    fn create_and_edit(&mut self, event: UiEvent) {
        if let Outcome::Select(id) = self.apply(event) {
            self.edit_node(&id);
        }
    }

    fn create_first_node(&mut self) {
        self.create_and_edit(UiEvent::EnterOnEmptyScope);
    }

    // ── Navigation ───────────────────────────────────────────────

    fn click_selected(&mut self, modifier: BulletModifier) -> bool {
        let Some(node_id) = self.selected_node_id().map(str::to_owned) else {
            return false;
        };
        self.apply(UiEvent::BulletClick { node_id, modifier }) == Outcome::Changed
    }

    fn breadcrumb_up(&mut self) {
        let doc = self.workspace.document();
        let Some(previous) = doc.focused_node_id.clone() else {
            return;
        };
        let target = doc.focus_path.len().checked_sub(2);

        self.apply(UiEvent::BreadcrumbClick(target));
        self.select_node(&previous);
    }

    fn switch_page_relative(&mut self, delta: isize) {
        let doc = self.workspace.document();
        let count = doc.pages.len() as isize;
        let Some(current) = doc.pages.iter().position(|p| p.id == doc.current_page_id) else {
            return;
        };
        let next = (current as isize + delta).rem_euclid(count) as usize;
        let page_id = doc.pages[next].id.clone();

        if self.apply(UiEvent::PageTabClick(page_id)) == Outcome::Changed {
            self.selected = 0;
        }
    }

    fn follow_link_in_selected(&mut self) {
        let target = self.cache.rows.get(self.selected).and_then(|row| {
            links::parse_tokens(&row.content)
                .into_iter()
                .find_map(|token| match token {
                    LinkToken::Link { target, .. } => Some(target),
                    LinkToken::Text(_) => None,
                })
        });
        self.follow_link(target);
    }

    fn follow_link_at_cursor(&mut self) {
        let target = self.editor.as_ref().and_then(|e| {
            links::link_at(&e.text, e.cursor)
                .or_else(|| e.cursor.checked_sub(1).and_then(|at| links::link_at(&e.text, at)))
        });
        if target.is_some() {
            self.finish_edit();
        }
        self.follow_link(target);
    }

    fn follow_link(&mut self, target: Option<LinkTarget>) {
        let Some(target) = target else {
            self.push_notification("no link here".to_string());
            return;
        };

        // Page switches and zooms both start at the top of the new scope.
        if self.apply(UiEvent::LinkClick(target)) == Outcome::Changed {
            self.selected = 0;
        }
    }

    fn toggle_backlinks_panel(&mut self) {
        if self.mode == Mode::Backlinks {
            self.backlinks_visible = false;
            self.mode = Mode::Normal;
        } else {
            self.backlinks_visible = true;
            self.backlinks_selected = 0;
            self.mode = Mode::Backlinks;
        }
    }

    fn open_picker(&mut self) {
        self.picker_query.clear();
        self.refresh_picker_results();
        self.mode = Mode::PagePicker;
    }

    fn close_picker(&mut self) {
        self.mode = Mode::Normal;
        self.picker_query.clear();
        self.picker_results.clear();
        self.picker_selected = 0;
    }

    fn refresh_picker_results(&mut self) {
        let pages = &self.workspace.document().pages;
        self.picker_selected = 0;

        if self.picker_query.is_empty() {
            self.picker_results = pages
                .iter()
                .map(|p| PickerResult {
                    page_id: p.id.clone(),
                    name: p.name.clone(),
                })
                .collect();
            return;
        }

        let matcher = SkimMatcherV2::default();
        let mut scored: Vec<(i64, PickerResult)> = pages
            .iter()
            .filter_map(|p| {
                matcher.fuzzy_match(&p.name, &self.picker_query).map(|score| {
                    (
                        score,
                        PickerResult {
                            page_id: p.id.clone(),
                            name: p.name.clone(),
                        },
                    )
                })
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        self.picker_results = scored.into_iter().map(|(_, r)| r).collect();
    }

    // ── Commands ─────────────────────────────────────────────────

    fn run_command(&mut self, input: &str) {
        if input.is_empty() {
            return;
        }
        let (name, arg) = input
            .split_once(' ')
            .map_or((input, ""), |(name, arg)| (name, arg.trim()));

        match (name, arg) {
            ("help", _) => {
                for line in [
                    "commands:",
                    "  page <name>       open or create a page",
                    "  delpage           delete the current page",
                    "  export [path]     write JSON (default: export file next to the data)",
                    "  export clipboard  copy JSON to the clipboard",
                    "  import <path>     replace everything with a JSON file",
                    "  import paste      replace everything with pasted JSON",
                    "  crumb <n>         zoom out to breadcrumb n (0 = outermost)",
                    "  top               leave focus",
                    "  q                 quit",
                ] {
                    self.push_notification(line.to_string());
                }
            }
            ("q" | "quit", _) => self.should_quit = true,
            ("page", "") => self.push_notification("usage: page <name>".to_string()),
            ("page", page) => {
                if self.apply(UiEvent::AddPage(page.to_string())) == Outcome::Changed {
                    self.selected = 0;
                }
            }
            ("delpage", _) => self.mode = Mode::ConfirmDeletePage,
            ("export", "clipboard") => self.export_to_clipboard(),
            ("export", "") => {
                let path = self.config.export_path();
                self.export_to_file(path);
            }
            ("export", path) => match config::expand_home(path) {
                Ok(path) => self.export_to_file(PathBuf::from(path)),
                Err(e) => self.push_notification(format!("export failed: {e}")),
            },
            ("import", "") => self.push_notification("usage: import <path> | paste".to_string()),
            ("import", "paste") => {
                self.mode = Mode::ImportPaste;
                self.push_notification("paste JSON to import, Esc cancels".to_string());
            }
            ("import", path) => match config::expand_home(path) {
                Ok(path) => storage::spawn_import_read(PathBuf::from(path), self.event_tx.clone()),
                Err(e) => self.push_notification(ImportError::Read(e.to_string()).to_string()),
            },
            ("crumb", n) => match n.parse::<usize>() {
                Ok(index) => {
                    if self.apply(UiEvent::BreadcrumbClick(Some(index))) == Outcome::Changed {
                        self.selected = 0;
                    } else {
                        self.push_notification(format!("no breadcrumb {index}"));
                    }
                }
                Err(_) => self.push_notification("usage: crumb <n>".to_string()),
            },
            ("top", _) => {
                self.apply(UiEvent::BreadcrumbClick(None));
            }
            _ => self.push_notification(format!("unknown command: {input}")),
        }
    }

    fn export_to_file(&mut self, path: PathBuf) {
        if path == self.config.data_file() {
            self.push_notification("refusing to export over the data file".to_string());
            return;
        }
        match self.workspace.export_json() {
            Ok(json) => storage::spawn_export(path, json, self.event_tx.clone()),
            Err(e) => {
                tracing::error!("export serialization failed: {e}");
                self.push_notification(format!("export failed: {e}"));
            }
        }
    }

    fn export_to_clipboard(&mut self) {
        match self.workspace.export_json() {
            Ok(json) => match self.clipboard.copy(&json) {
                Ok(()) => self.push_notification("copied document JSON".to_string()),
                Err(e) => self.push_notification(format!("failed to copy: {e}")),
            },
            Err(e) => self.push_notification(format!("export failed: {e}")),
        }
    }

    fn copy_to_clipboard(&mut self, text: &str) {
        match self.clipboard.copy(text) {
            Ok(()) => self.push_notification(format!("copied {}", truncate(text, 40))),
            Err(e) => {
                tracing::warn!("clipboard copy failed: {e}");
                self.push_notification(format!("failed to copy: {e}"));
            }
        }
    }

    // ── MVU: View ────────────────────────────────────────────────

    pub fn view(&mut self, frame: &mut Frame) {
        if self.cache.dirty {
            self.refresh();
        }

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1), // page tabs
                Constraint::Length(1), // breadcrumb
                Constraint::Min(1),    // outline
                Constraint::Length(1), // status bar
            ])
            .split(frame.area());

        self.render_tab_bar(frame, chunks[0]);
        self.render_breadcrumb(frame, chunks[1]);

        if self.backlinks_visible {
            let body = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Min(1), Constraint::Percentage(30)])
                .split(chunks[2]);
            self.render_outline(frame, body[0]);
            self.render_backlinks_panel(frame, body[1]);
        } else {
            self.render_outline(frame, chunks[2]);
        }

        self.render_status_bar(frame, chunks[3]);

        match self.mode {
            Mode::PagePicker => self.render_picker_overlay(frame),
            Mode::Command => self.render_prompt_overlay(frame, " Command ", ":"),
            Mode::PageName => self.render_prompt_overlay(frame, " New Page ", ""),
            _ => {}
        }
    }

    fn render_tab_bar(&self, frame: &mut Frame, area: Rect) {
        let doc = self.workspace.document();
        let mut spans = Vec::new();

        for page in &doc.pages {
            let style = if page.id == doc.current_page_id {
                Style::default()
                    .bg(Color::Rgb(30, 30, 45))
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().bg(Color::Rgb(18, 18, 28)).fg(Color::Gray)
            };
            spans.push(Span::styled(format!(" {} ", page.name), style));
        }

        spans.push(Span::styled(
            "  Ctrl+N/P: Pages  /: Find  P: New  Ctrl+B: Backlinks  gd: Follow  : Command (help)  q: Quit ",
            Style::default()
                .bg(Color::Rgb(20, 20, 30))
                .fg(Color::DarkGray),
        ));

        frame.render_widget(
            Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Rgb(20, 20, 30))),
            area,
        );
    }

    fn render_breadcrumb(&self, frame: &mut Frame, area: Rect) {
        let doc = self.workspace.document();
        let Some(page) = doc.current_page() else {
            return;
        };

        let crumb_style = Style::default().fg(Color::Gray);
        let mut spans = vec![Span::styled(
            page.name.clone(),
            if doc.is_focused() {
                crumb_style
            } else {
                crumb_style.fg(Color::Cyan).add_modifier(Modifier::BOLD)
            },
        )];

        let last = doc.focus_path.len().saturating_sub(1);
        for (idx, id) in doc.focus_path.iter().enumerate() {
            let label = tree::find_by_id(&page.nodes, id)
                .map(|n| n.content.as_str())
                .filter(|c| !c.is_empty())
                .unwrap_or(self.config.outline.untitled_label.as_str());

            spans.push(Span::styled(" › ", Style::default().fg(Color::DarkGray)));
            let style = if idx == last {
                crumb_style.fg(Color::Cyan).add_modifier(Modifier::BOLD)
            } else {
                crumb_style
            };
            spans.push(Span::styled(truncate(label, 24), style));
        }

        frame.render_widget(
            Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Rgb(12, 12, 18))),
            area,
        );
    }

    fn render_outline(&mut self, frame: &mut Frame, area: Rect) {
        let height = area.height as usize;
        let background = Style::default().bg(Color::Rgb(12, 12, 18));

        if self.cache.rows.is_empty() {
            let hint = Paragraph::new(Span::styled(
                "Nothing here yet. Press Enter to add a node.",
                Style::default().fg(Color::DarkGray),
            ))
            .style(background);
            frame.render_widget(hint, area);
            return;
        }

        if self.selected < self.cache.top {
            self.cache.top = self.selected;
        } else if height > 0 && self.selected >= self.cache.top + height {
            self.cache.top = self.selected + 1 - height;
        }
        let top = self.cache.top;
        let bottom = (top + height).min(self.cache.rows.len());
        let indent_width = self.config.outline.indent_width as usize;

        let lines: Vec<Line> = self.cache.rows[top..bottom]
            .iter()
            .enumerate()
            .map(|(offset, row)| {
                let editing = self.editor.as_ref().filter(|e| e.node_id == row.node_id);
                let text = editing.map_or(row.content.as_str(), |e| e.text.as_str());

                let bullet = match (row.has_children, row.collapsed) {
                    (false, _) => "•",
                    (true, false) => "▾",
                    (true, true) => "▸",
                };
                let mut spans = vec![
                    Span::raw(" ".repeat(row.depth * indent_width)),
                    Span::styled(format!("{bullet} "), Style::default().fg(Color::Magenta)),
                ];

                if text.is_empty() {
                    spans.push(Span::styled(PLACEHOLDER, Style::default().fg(Color::DarkGray)));
                } else {
                    spans.extend(link_spans(text, Style::default().fg(Color::White)));
                }

                let line = Line::from(spans);
                if top + offset == self.selected {
                    line.style(Style::default().bg(Color::Rgb(30, 30, 45)))
                } else {
                    line
                }
            })
            .collect();

        frame.render_widget(Paragraph::new(lines).style(background), area);

        let Some(editor) = &self.editor else {
            return;
        };
        let Some(pos) = self.row_index(&editor.node_id).filter(|pos| (top..bottom).contains(pos))
        else {
            return;
        };
        let prefix = self.cache.rows[pos].depth * indent_width + 2;
        let typed = Span::raw(&editor.text[..editor.cursor]).width();
        let x = area.x + (prefix + typed).min(area.width.saturating_sub(1) as usize) as u16;
        let y = area.y + (pos - top) as u16;
        frame.set_cursor_position((x, y));
    }

    fn render_backlinks_panel(&self, frame: &mut Frame, area: Rect) {
        let backlinks = &self.cache.backlinks;
        let in_panel = self.mode == Mode::Backlinks;
        let header = Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD);

        let mut lines: Vec<Line> = Vec::new();
        if backlinks.is_empty() {
            lines.push(Line::from(Span::styled(
                "No backlinks",
                Style::default().fg(Color::DarkGray),
            )));
        }

        let sections: [(&str, &[LinkRecord]); 2] = [
            ("Page links", backlinks.page_links.as_slice()),
            ("Node links", backlinks.node_links.as_slice()),
        ];
        let mut idx = 0;
        for (title, records) in sections {
            if records.is_empty() {
                continue;
            }
            lines.push(Line::from(Span::styled(title, header)));
            for record in records {
                let label = format!(
                    "{}: {}",
                    record.source_page_name,
                    truncate(&record.source_content, 42)
                );
                let style = if in_panel && idx == self.backlinks_selected {
                    Style::default().fg(Color::Black).bg(Color::Cyan)
                } else {
                    Style::default().fg(Color::Gray)
                };
                lines.push(Line::from(Span::styled(label, style)));
                idx += 1;
            }
        }

        let panel = Paragraph::new(lines).block(
            Block::default()
                .title(format!(" Backlinks ({}) ", backlinks.len()))
                .borders(Borders::LEFT)
                .style(Style::default().bg(Color::Rgb(12, 12, 18))),
        );
        frame.render_widget(panel, area);
    }

    fn render_status_bar(&self, frame: &mut Frame, area: Rect) {
        let mode_style = match self.mode {
            Mode::Normal => Style::default()
                .fg(Color::Black)
                .bg(Color::Magenta)
                .add_modifier(Modifier::BOLD),
            Mode::Insert => Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
            _ => Style::default()
                .fg(Color::Black)
                .bg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        };
        let mode_span = Span::styled(format!(" {} ", self.mode.label()), mode_style);

        let doc = self.workspace.document();
        let page_name = doc.current_page().map_or("", |p| p.name.as_str());
        let depth = if doc.is_focused() {
            format!("  zoom {}", doc.focus_path.len())
        } else {
            String::new()
        };

        let suffix = match self.mode {
            Mode::ConfirmDeletePage => format!(" | delete page \"{page_name}\"? (y/n)"),
            Mode::ImportPaste => " | paste JSON to import (Esc cancels)".to_string(),
            _ => match (self.notification_until, self.notifications.back()) {
                (Some(_), Some(note)) => format!(" | {note}"),
                _ => String::new(),
            },
        };

        let info = Span::styled(
            format!(" {page_name}{depth}  {} nodes{suffix} ", self.cache.rows.len()),
            Style::default().fg(Color::Gray).bg(Color::DarkGray),
        );

        let status = Paragraph::new(Line::from(vec![mode_span, info]))
            .style(Style::default().bg(Color::DarkGray));
        frame.render_widget(status, area);
    }

    fn render_picker_overlay(&self, frame: &mut Frame) {
        let area = centered_rect(60, 50, frame.area());
        frame.render_widget(Clear, area);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(1),
                Constraint::Length(3),
            ])
            .split(area);

        let input = Paragraph::new(self.picker_query.clone()).block(
            Block::default()
                .title(" Pages ")
                .borders(Borders::ALL)
                .style(Style::default().bg(Color::Rgb(15, 15, 24))),
        );
        frame.render_widget(input, chunks[0]);

        let results: Vec<Line> = if self.picker_results.is_empty() {
            vec![Line::from(Span::styled(
                format!("Enter: create \"{}\"", self.picker_query.trim()),
                Style::default().fg(Color::DarkGray),
            ))]
        } else {
            self.picker_results
                .iter()
                .enumerate()
                .map(|(idx, item)| {
                    if idx == self.picker_selected {
                        Line::from(Span::styled(
                            format!("> {}", item.name),
                            Style::default().fg(Color::Black).bg(Color::Cyan),
                        ))
                    } else {
                        Line::from(Span::styled(
                            format!("  {}", item.name),
                            Style::default().fg(Color::Gray),
                        ))
                    }
                })
                .collect()
        };

        let result_block = Paragraph::new(results).block(
            Block::default()
                .borders(Borders::LEFT | Borders::RIGHT)
                .style(Style::default().bg(Color::Rgb(10, 10, 18))),
        );
        frame.render_widget(result_block, chunks[1]);

        let footer = Paragraph::new(" Enter: open  Esc: close  ↑/↓: move ").block(
            Block::default().borders(Borders::ALL).style(
                Style::default()
                    .bg(Color::Rgb(15, 15, 24))
                    .fg(Color::DarkGray),
            ),
        );
        frame.render_widget(footer, chunks[2]);

        let typed = Span::raw(self.picker_query.as_str()).width() as u16;
        frame.set_cursor_position((chunks[0].x + 1 + typed, chunks[0].y + 1));
    }

    fn render_prompt_overlay(&self, frame: &mut Frame, title: &str, prefix: &str) {
        let area = centered_rect(60, 20, frame.area());
        frame.render_widget(Clear, area);

        let prompt = Paragraph::new(format!("{prefix}{}", self.prompt_input)).block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .style(Style::default().bg(Color::Rgb(15, 15, 24))),
        );
        frame.render_widget(prompt, area);

        let typed = Span::raw(format!("{prefix}{}", self.prompt_input)).width() as u16;
        frame.set_cursor_position((area.x + 1 + typed, area.y + 1));
    }
}

/// Pre-order rows for `nodes`, skipping the children of collapsed nodes.
fn flatten(nodes: &[Node], depth: usize, rows: &mut Vec<Row>) {
    for node in nodes {
        rows.push(Row {
            node_id: node.id.clone(),
            depth,
            content: node.content.clone(),
            has_children: node.has_children(),
            collapsed: node.collapsed,
        });
        if node.has_children() && !node.collapsed {
            flatten(&node.children, depth + 1, rows);
        }
    }
}

fn link_spans(text: &str, base: Style) -> Vec<Span<'static>> {
    links::parse_tokens(text)
        .into_iter()
        .map(|token| match token {
            LinkToken::Text(range) => Span::styled(text[range].to_string(), base),
            LinkToken::Link { span, target } => {
                let style = match target {
                    LinkTarget::Page(_) => base
                        .fg(Color::Rgb(0, 255, 136))
                        .add_modifier(Modifier::UNDERLINED | Modifier::BOLD),
                    LinkTarget::Node(_) => base
                        .fg(Color::Rgb(102, 204, 255))
                        .add_modifier(Modifier::UNDERLINED),
                    LinkTarget::Web { .. } => base
                        .fg(Color::Rgb(255, 102, 0))
                        .add_modifier(Modifier::UNDERLINED),
                };
                Span::styled(text[span].to_string(), style)
            }
        })
        .collect()
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::clipboard::ClipboardError;
    use crate::storage::{JsonFileStore, Persistence};

    struct FakeClipboard(Rc<RefCell<Vec<String>>>);

    impl Clipboard for FakeClipboard {
        fn copy(&self, text: &str) -> Result<(), ClipboardError> {
            self.0.borrow_mut().push(text.to_string());
            Ok(())
        }
    }

    struct Harness {
        app: App,
        copied: Rc<RefCell<Vec<String>>>,
        rx: mpsc::Receiver<Msg>,
        dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().expect("tempdir");
        let (tx, rx) = mpsc::channel();
        let store = JsonFileStore::new(dir.path().join("data.json"));
        let workspace = Workspace::open(Box::new(store), Box::new(tx.clone()));
        let copied = Rc::new(RefCell::new(Vec::new()));
        let config = AppConfig::defaults().expect("default config should parse");
        let app = App::new(config, workspace, tx, Box::new(FakeClipboard(copied.clone())));
        Harness {
            app,
            copied,
            rx,
            dir,
        }
    }

    fn press(app: &mut App, code: KeyCode) {
        app.update(Msg::Key(KeyEvent::new(code, KeyModifiers::NONE)))
            .expect("update should succeed");
    }

    fn type_str(app: &mut App, text: &str) {
        for ch in text.chars() {
            press(app, KeyCode::Char(ch));
        }
    }

    fn content(app: &App, node_id: &str) -> Option<String> {
        app.workspace()
            .current_page()
            .and_then(|p| tree::find_by_id(&p.nodes, node_id))
            .map(|n| n.content.clone())
    }

    #[test]
    fn typing_updates_node_content() {
        let mut h = harness();
        press(&mut h.app, KeyCode::Char('j'));
        press(&mut h.app, KeyCode::Char('i'));
        assert_eq!(h.app.mode, Mode::Insert);
        type_str(&mut h.app, "!");
        assert_eq!(
            content(&h.app, "node2").as_deref(),
            Some("Press Enter to create a new node at the same level!")
        );
        press(&mut h.app, KeyCode::Esc);
        assert_eq!(h.app.mode, Mode::Normal);
    }

    #[test]
    fn enter_creates_sibling_and_backspace_removes_it() {
        let mut h = harness();
        press(&mut h.app, KeyCode::Char('j'));
        press(&mut h.app, KeyCode::Char('i'));
        press(&mut h.app, KeyCode::Enter);

        assert_eq!(h.app.editor.as_ref().map(|e| e.node_id.as_str()), Some("node7"));
        assert_eq!(h.app.selected_node_id(), Some("node7"));

        press(&mut h.app, KeyCode::Backspace);
        assert!(content(&h.app, "node7").is_none());
        let editor = h.app.editor.as_ref().expect("still editing");
        assert_eq!(editor.node_id, "node2");
        assert_eq!(editor.cursor, editor.text.len());
    }

    #[test]
    fn focus_and_zoom_out_keep_selection_sensible() {
        let mut h = harness();
        press(&mut h.app, KeyCode::Enter);
        assert_eq!(h.app.workspace().document().focus_path, ["node1"]);
        assert_eq!(h.app.selected_node_id(), Some("node2"));

        press(&mut h.app, KeyCode::Char('h'));
        assert!(!h.app.workspace().document().is_focused());
        assert_eq!(h.app.selected_node_id(), Some("node1"));
    }

    #[test]
    fn collapse_hides_rows() {
        let mut h = harness();
        assert_eq!(h.app.cache.rows.len(), 5);
        press(&mut h.app, KeyCode::Char(' '));
        assert_eq!(h.app.cache.rows.len(), 1);
        press(&mut h.app, KeyCode::Char('z'));
        press(&mut h.app, KeyCode::Char('a'));
        assert_eq!(h.app.cache.rows.len(), 5);
    }

    #[test]
    fn export_never_targets_the_data_file() {
        let mut h = harness();
        let data_file = h.dir.path().join("data.json");
        h.app.config.general.data_file = data_file.display().to_string();

        h.app.run_command(&format!("export {}", data_file.display()));
        assert_eq!(
            h.app.notifications.back().map(String::as_str),
            Some("refusing to export over the data file")
        );
        assert!(h.rx.try_recv().is_err());

        h.app.run_command("export");
        match h.rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Msg::ExportFinished { path, result }) => {
                assert!(result.is_ok());
                assert_eq!(path, h.dir.path().join("outliner-export.json"));
            }
            other => panic!("expected export completion, got {other:?}"),
        }
        assert!(JsonFileStore::new(data_file).load().is_none());
    }

    #[test]
    fn yank_copies_node_id() {
        let mut h = harness();
        press(&mut h.app, KeyCode::Char('j'));
        press(&mut h.app, KeyCode::Char('y'));
        assert_eq!(h.copied.borrow().as_slice(), ["node2"]);
    }

    #[test]
    fn follow_page_link_creates_page() {
        let mut h = harness();
        press(&mut h.app, KeyCode::Char('G'));
        assert_eq!(h.app.selected_node_id(), Some("node5"));
        press(&mut h.app, KeyCode::Char('g'));
        press(&mut h.app, KeyCode::Char('d'));

        let page = h.app.workspace().current_page().expect("current page");
        assert_eq!(page.name, "Page Name");
        assert_eq!(h.app.cache.rows.len(), 1);
    }

    #[test]
    fn page_command_and_backlinks_panel() {
        let mut h = harness();
        press(&mut h.app, KeyCode::Char(':'));
        type_str(&mut h.app, "page Page Name");
        press(&mut h.app, KeyCode::Enter);
        assert_eq!(h.app.mode, Mode::Normal);
        assert_eq!(h.app.cache.backlinks.page_links.len(), 1);

        h.app
            .update(Msg::Key(KeyEvent::new(KeyCode::Char('b'), KeyModifiers::CONTROL)))
            .expect("update should succeed");
        assert_eq!(h.app.mode, Mode::Backlinks);
        press(&mut h.app, KeyCode::Enter);
        assert_eq!(h.app.workspace().document().current_page_id, "page1");
        assert_eq!(h.app.selected_node_id(), Some("node5"));
    }

    #[test]
    fn pasted_json_replaces_document() {
        let mut h = harness();
        press(&mut h.app, KeyCode::Char(':'));
        type_str(&mut h.app, "import paste");
        press(&mut h.app, KeyCode::Enter);
        assert_eq!(h.app.mode, Mode::ImportPaste);

        let json = r#"{"pages": [{"id": "page1", "name": "Imported", "nodes": [{"id": "node10", "content": "hi"}]}]}"#;
        h.app
            .update(Msg::Paste(json.to_string()))
            .expect("update should succeed");
        assert_eq!(h.app.mode, Mode::Normal);
        assert_eq!(
            h.app.workspace().current_page().map(|p| p.name.as_str()),
            Some("Imported")
        );
        assert_eq!(h.app.selected_node_id(), Some("node10"));
    }

    #[test]
    fn truncate_counts_chars() {
        assert_eq!(truncate("héllo", 3), "hél…");
        assert_eq!(truncate("hi", 3), "hi");
    }
}
