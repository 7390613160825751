use colored::{ColoredString, Colorize};
use domain::models::{SearchResult, ToolDescriptor};
use domain::session::Session;
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag};

pub const THINKING_INDICATOR: &str = "AI is thinking...";
pub const SEARCHING_INDICATOR: &str = "Searching for results...";

/// Renders markdown as ANSI-styled terminal text.
pub fn render_markdown(source: &str) -> String {
    let mut renderer = Renderer::default();
    let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
    for event in Parser::new_ext(source, options) {
        renderer.event(event);
    }
    renderer.finish()
}

#[derive(Debug)]
enum Block {
    Paragraph,
    Heading,
    Quote,
    List,
    Item,
    CodeBlock,
    Emphasis,
    Strong,
    Strike,
    Link(String),
    Other,
}

#[derive(Default)]
struct Renderer {
    out: String,
    stack: Vec<Block>,
    /// Next number per open list; `None` for bullet lists.
    lists: Vec<Option<u64>>,
    quote_depth: usize,
    heading: bool,
    emphasis: usize,
    strong: usize,
    strike: usize,
    code_block: bool,
    /// Set right after a list bullet, so a paragraph inside the item does
    /// not open a new line.
    after_bullet: bool,
}

impl Renderer {
    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(_) => self.end(),
            Event::Text(text) => self.text(&text),
            Event::Code(code) => {
                let styled = format!("`{code}`").yellow();
                self.push_styled(styled);
            }
            Event::SoftBreak | Event::HardBreak => self.newline(),
            Event::Rule => {
                self.gap();
                self.write_line_start();
                self.out.push_str(&"────────────────".dimmed().to_string());
                self.newline();
            }
            Event::Html(html) | Event::InlineHtml(html) => self.text(&html),
            Event::TaskListMarker(checked) => {
                self.out.push_str(if checked { "[x] " } else { "[ ] " });
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        let block = match tag {
            Tag::Paragraph => {
                self.gap();
                Block::Paragraph
            }
            Tag::Heading { .. } => {
                self.gap();
                self.heading = true;
                Block::Heading
            }
            Tag::BlockQuote(_) => {
                self.gap();
                self.quote_depth += 1;
                Block::Quote
            }
            Tag::CodeBlock(kind) => {
                self.gap();
                if let CodeBlockKind::Fenced(lang) = kind {
                    if !lang.is_empty() {
                        self.write_line_start();
                        self.out.push_str(&format!("    [{lang}]").dimmed().to_string());
                        self.newline();
                    }
                }
                self.code_block = true;
                Block::CodeBlock
            }
            Tag::List(start) => {
                if self.lists.is_empty() {
                    self.gap();
                } else {
                    self.end_line();
                }
                self.lists.push(start);
                Block::List
            }
            Tag::Item => {
                self.end_line();
                self.write_line_start();
                let indent = "  ".repeat(self.lists.len().saturating_sub(1));
                let marker = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{n}. ");
                        *n += 1;
                        marker
                    }
                    _ => "• ".to_string(),
                };
                self.out.push_str(&indent);
                self.out.push_str(&marker);
                self.after_bullet = true;
                Block::Item
            }
            Tag::Emphasis => {
                self.emphasis += 1;
                Block::Emphasis
            }
            Tag::Strong => {
                self.strong += 1;
                Block::Strong
            }
            Tag::Strikethrough => {
                self.strike += 1;
                Block::Strike
            }
            Tag::Link { dest_url, .. } => Block::Link(dest_url.to_string()),
            _ => Block::Other,
        };
        self.stack.push(block);
    }

    fn end(&mut self) {
        match self.stack.pop() {
            Some(Block::Paragraph) => self.end_line(),
            Some(Block::Heading) => {
                self.heading = false;
                self.end_line();
            }
            Some(Block::Quote) => {
                self.end_line();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            Some(Block::CodeBlock) => {
                self.code_block = false;
                self.end_line();
            }
            Some(Block::List) => {
                self.lists.pop();
                self.end_line();
            }
            Some(Block::Item) => self.end_line(),
            Some(Block::Emphasis) => self.emphasis = self.emphasis.saturating_sub(1),
            Some(Block::Strong) => self.strong = self.strong.saturating_sub(1),
            Some(Block::Strike) => self.strike = self.strike.saturating_sub(1),
            Some(Block::Link(url)) => {
                if !url.is_empty() {
                    self.out.push_str(&format!(" ({url})").dimmed().to_string());
                }
            }
            Some(Block::Other) | None => {}
        }
    }

    fn text(&mut self, text: &str) {
        if self.code_block {
            for line in text.lines() {
                self.write_line_start();
                self.out.push_str("    ");
                self.out.push_str(&line.cyan().to_string());
                self.newline();
            }
            return;
        }

        let mut first = true;
        for line in text.split('\n') {
            if !first {
                self.newline();
            }
            first = false;
            if !line.is_empty() {
                let styled = self.style(line);
                self.push_styled(styled);
            }
        }
    }

    fn style(&self, text: &str) -> ColoredString {
        let mut styled = text.normal();
        if self.heading {
            styled = styled.bold().underline();
        }
        if self.strong > 0 {
            styled = styled.bold();
        }
        if self.emphasis > 0 {
            styled = styled.italic();
        }
        if self.strike > 0 {
            styled = styled.strikethrough();
        }
        if self.stack.iter().any(|b| matches!(b, Block::Link(_))) {
            styled = styled.blue();
        }
        styled
    }

    fn push_styled(&mut self, styled: ColoredString) {
        self.write_line_start();
        self.out.push_str(&styled.to_string());
        self.after_bullet = false;
    }

    fn at_line_start(&self) -> bool {
        self.out.is_empty() || self.out.ends_with('\n')
    }

    /// Quote bars for a fresh line.
    fn write_line_start(&mut self) {
        if self.at_line_start() && self.quote_depth > 0 {
            let bars = "│ ".repeat(self.quote_depth);
            self.out.push_str(&bars.dimmed().to_string());
        }
    }

    fn newline(&mut self) {
        self.out.push('\n');
    }

    fn end_line(&mut self) {
        if !self.at_line_start() {
            self.newline();
        }
    }

    /// Blank line between top-level blocks.
    fn gap(&mut self) {
        if self.after_bullet {
            return;
        }
        self.end_line();
        if !self.out.is_empty() && !self.out.ends_with("\n\n") && self.lists.is_empty() {
            self.newline();
        }
    }

    fn finish(self) -> String {
        self.out.trim_end_matches('\n').to_string()
    }
}

pub fn render_user_badge(session: &Session) -> String {
    format!(
        "{} {}",
        format!("[{}]", session.avatar_letter()).white().on_blue().bold(),
        session.display_name()
    )
}

/// One search hit: chunk id, snippet and source file. `raw` prints the
/// snippet as plain text instead of rendering it.
pub fn render_search_result(result: &SearchResult, raw: bool) -> String {
    let snippet = if raw {
        result.text.clone()
    } else {
        render_markdown(&result.text)
    };
    format!(
        "{}\n{}\n{}",
        format!("Chunk: {}", result.id).bold(),
        snippet,
        result.filename.dimmed()
    )
}

pub fn render_search_results(query: &str, results: &[SearchResult], raw: bool) -> String {
    if results.is_empty() {
        return format!("No results found for \"{query}\"").dimmed().to_string();
    }
    let separator = "─".repeat(40).dimmed().to_string();
    results
        .iter()
        .map(|r| render_search_result(r, raw))
        .collect::<Vec<_>>()
        .join(&format!("\n{separator}\n"))
}

pub fn render_tools(tools: &[ToolDescriptor]) -> String {
    if tools.is_empty() {
        return "The backend exposes no tools.".dimmed().to_string();
    }
    tools
        .iter()
        .map(|tool| match &tool.description {
            Some(description) => format!("{} {}", tool.name.green(), description),
            None => tool.name.green().to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
