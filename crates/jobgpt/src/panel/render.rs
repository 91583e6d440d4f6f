//! Pure rendering of [`PanelState`] into what the panel displays.
//!
//! [`render`] has no side effects and depends only on its input, so the
//! same state always produces the same [`PanelView`].

use pulldown_cmark::escape::{escape_href, escape_html};
use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, html};
use serde::Serialize;

use super::{PanelState, Status};
use crate::error::ErrorCode;

pub const LOADING_TEXT: &str = "Please wait..";
pub const ADD_API_KEY_TEXT: &str = "Please add your OpenAI API key and try again.";

/// Display model of the panel.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct PanelView {
    pub input_value: String,
    pub input_disabled: bool,
    /// `"Go"`, or `"Cancel"` while loading.
    pub button_label: &'static str,
    pub busy: bool,
    pub content_html: String,
    /// Whether the token counter row is shown.
    pub meta_visible: bool,
    pub tokens_label: Option<String>,
    /// The credential-entry surface should be opened.
    pub open_options: bool,
}

/// Render `state`.
pub fn render(state: &PanelState) -> PanelView {
    let mut view = PanelView {
        input_value: state.search_string.clone(),
        input_disabled: false,
        button_label: "Go",
        busy: false,
        content_html: String::new(),
        meta_visible: false,
        tokens_label: None,
        open_options: false,
    };

    match state.status {
        Status::Idle => {}
        Status::Loading => {
            view.input_disabled = true;
            view.busy = true;
            view.button_label = "Cancel";
            view.content_html = text_to_html(LOADING_TEXT);
        }
        Status::Success => {
            view.content_html = markdown_to_html(&state.content);
            view.tokens_label = Some(format!(
                "{} tokens",
                state.tokens.map_or(0, |t| t.total_tokens)
            ));
            view.meta_visible = !state.content.is_empty();
        }
        Status::Error if state.error == Some(ErrorCode::MissingApiKey) => {
            view.content_html = text_to_html(ADD_API_KEY_TEXT);
            view.open_options = true;
        }
        Status::Error | Status::Aborted => {
            view.content_html = text_to_html(&state.content);
        }
    }

    view
}

/// Render markdown to HTML. Links open in a new tab and raw HTML in the
/// source is shown as text.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Start(Tag::Link(_, dest, title)) => Event::Html(link_open(&dest, &title)),
        Event::End(Tag::Link(..)) => Event::Html("</a>".into()),
        Event::Html(raw) => Event::Text(raw),
        other => other,
    });

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

fn link_open(dest: &str, title: &str) -> CowStr<'static> {
    // Writing into a String cannot fail.
    let mut tag = String::from("<a target=\"_blank\" href=\"");
    let _ = escape_href(&mut tag, dest);
    if !title.is_empty() {
        tag.push_str("\" title=\"");
        let _ = escape_html(&mut tag, title);
    }
    tag.push_str("\">");
    tag.into()
}

/// Render plain text as one escaped paragraph.
fn text_to_html(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let events = [
        Event::Start(Tag::Paragraph),
        Event::Text(text.into()),
        Event::End(Tag::Paragraph),
    ];
    let mut out = String::new();
    html::push_html(&mut out, events.into_iter());
    out
}
