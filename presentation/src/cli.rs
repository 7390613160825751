use crate::clipboard::copy_to_clipboard;
use crate::render::{
    render_markdown, render_search_results, render_tools, render_user_badge,
    SEARCHING_INDICATOR, THINKING_INDICATOR,
};
use crate::terminal::{erase_output, PendingLine};
use application::auth_service::{AuthService, BootstrapOutcome};
use application::chat_service::{ChatOutcome, ChatService};
use application::search_service::{SearchOutcome, SearchService};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use domain::route::{Route, RouteDecision};
use domain::think::{strip_think_tags, strip_think_tags_partial};
use infrastructure::backend_client::BackendClient;
use infrastructure::config::Config;
use infrastructure::identity::OidcClient;
use infrastructure::session_guard::SessionGuard;
use infrastructure::session_store::SessionStore;
use shared::confirmation::{ask_confirmation, ask_line};
use shared::types::Result;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Parser, Debug)]
#[command(name = "files-assistant")]
#[command(about = "Chat with and search your personal files")]
pub struct Cli {
    /// More log output (-v info, -vv debug); RUST_LOG wins when set
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Backend base URL, overriding FILES_ASSISTANT_BACKEND_URL
    #[arg(long, global = true)]
    pub backend_url: Option<String>,

    /// Copy each chat answer to the clipboard
    #[arg(long, global = true)]
    pub copy: bool,

    /// Print search snippets as plain text instead of rendered markdown
    #[arg(long, global = true)]
    pub raw: bool,

    /// Keep <think> sections in chat answers
    #[arg(long, global = true)]
    pub show_thinking: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Log in through the identity provider
    Login,
    /// End the session locally and at the identity provider
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Semantic search over indexed files
    Search {
        #[arg(required = true)]
        text: Vec<String>,
        /// Number of results to ask for
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Ask one question
    Chat {
        /// System instruction sent along with the prompt
        #[arg(long, default_value = "")]
        system: String,
        /// Print the answer while it is generated
        #[arg(long)]
        stream: bool,
        #[arg(required = true)]
        prompt: Vec<String>,
    },
    /// List the tools the backend exposes
    Tools,
    /// Interactive session (default)
    Repl,
}

#[derive(Debug, Clone, Copy, Default)]
struct ViewOptions {
    copy: bool,
    raw: bool,
    show_thinking: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum ReplCommand<'a> {
    Empty,
    Chat(&'a str),
    Stream(&'a str),
    Search(&'a str),
    System(&'a str),
    History,
    Tools,
    Copy,
    Logout,
    Help,
    Exit,
    Unknown(&'a str),
}

fn parse_repl_command(line: &str) -> ReplCommand<'_> {
    let line = line.trim();
    if line.is_empty() {
        return ReplCommand::Empty;
    }
    if !line.starts_with('/') {
        return ReplCommand::Chat(line);
    }
    let (name, rest) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (line, ""),
    };
    match name {
        "/chat" => ReplCommand::Chat(rest),
        "/stream" => ReplCommand::Stream(rest),
        "/search" => ReplCommand::Search(rest),
        "/system" => ReplCommand::System(rest),
        "/history" => ReplCommand::History,
        "/tools" => ReplCommand::Tools,
        "/copy" => ReplCommand::Copy,
        "/logout" => ReplCommand::Logout,
        "/help" | "/?" => ReplCommand::Help,
        "/exit" | "/quit" => ReplCommand::Exit,
        other => ReplCommand::Unknown(other),
    }
}

const REPL_HELP: &str = "\
  <text>            ask the assistant
  /chat <text>      same as a bare line
  /stream <text>    ask and print the answer as it is generated
  /search <text>    semantic search over your files
  /system [text]    set the system instruction (empty clears it)
  /history          prompts sent in this session
  /tools            tools the backend exposes
  /copy             copy the last answer to the clipboard
  /logout           log out
  /exit             quit";

/// Prints streamed fragments as they arrive. With think filtering on, text
/// that might still turn out to open a `<think>` section is held back until
/// more arrives or the stream ends.
struct StreamPrinter {
    show_thinking: bool,
    raw: String,
    /// Visible answer text the terminal currently reflects.
    shown: String,
    /// Everything written to stdout so far.
    printed: String,
    pending: PendingLine,
}

impl StreamPrinter {
    fn new(show_thinking: bool, pending: PendingLine) -> Self {
        Self {
            show_thinking,
            raw: String::new(),
            shown: String::new(),
            printed: String::new(),
            pending,
        }
    }

    fn push(&mut self, fragment: &str) {
        self.pending.clear();
        if let Some(delta) = self.accept(fragment) {
            self.print(&delta);
        }
    }

    fn finish(&mut self) {
        self.pending.clear();
        if let Some(delta) = self.flush() {
            self.print(&delta);
        }
    }

    fn printed(&self) -> &str {
        &self.printed
    }

    fn print(&mut self, delta: &str) {
        print_flush(delta);
        self.printed.push_str(delta);
    }

    fn accept(&mut self, fragment: &str) -> Option<String> {
        self.raw.push_str(fragment);
        if self.show_thinking {
            let visible = self.raw.clone();
            return self.emit(&visible);
        }
        let visible = strip_think_tags_partial(&self.raw);
        let settled = settled_len(&visible);
        self.emit(&visible[..settled])
    }

    /// Stream is over: whatever is still held back is final.
    fn flush(&mut self) -> Option<String> {
        let visible = if self.show_thinking {
            self.raw.clone()
        } else {
            strip_think_tags(&self.raw)
        };
        self.emit(&visible)
    }

    /// New text to print for `visible`. Text already on screen cannot be
    /// taken back, so if `visible` stopped extending it, the tail after the
    /// common prefix is printed instead.
    fn emit(&mut self, visible: &str) -> Option<String> {
        if self.shown.starts_with(visible) {
            return None;
        }
        let common = common_prefix_len(&self.shown, visible);
        let delta = visible[common..].to_string();
        self.shown = visible.to_string();
        Some(delta)
    }
}

/// Length of the prefix of `text` that can no longer become part of a
/// (possibly escaped) think tag: everything before the earliest `<` or `\`
/// near the end that is not followed by whitespace.
fn settled_len(text: &str) -> usize {
    const LOOKBACK: usize = 24;
    let window_start = text.len().saturating_sub(LOOKBACK);
    text.char_indices()
        .skip_while(|(i, _)| *i < window_start)
        .find(|&(i, c)| (c == '<' || c == '\\') && !text[i..].contains(char::is_whitespace))
        .map_or(text.len(), |(i, _)| i)
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.char_indices()
        .zip(b.chars())
        .find(|((_, x), y)| x != y)
        .map_or(a.len().min(b.len()), |((i, _), _)| i)
}

fn print_flush(text: &str) {
    print!("{text}");
    if let Err(e) = std::io::stdout().flush() {
        debug!("stdout flush failed: {e}");
    }
}

pub struct CliApp {
    options: ViewOptions,
    auth: AuthService,
    backend: BackendClient,
    chat: ChatService,
    search: SearchService,
    system_prompt: String,
}

impl CliApp {
    pub fn new(config: Config, cli: &Cli) -> Result<Self> {
        let provider = OidcClient::new(config.identity.clone(), config.connect_timeout)?;
        let guard = Arc::new(
            SessionGuard::new(provider, config.min_token_validity)
                .with_store(SessionStore::new(config.session_path.clone())),
        );
        let backend = BackendClient::new(
            &config.backend_url,
            Arc::clone(&guard),
            config.connect_timeout,
            config.stream_token_in_query,
        )?;
        debug!("Backend at {}", config.backend_url);

        Ok(Self {
            options: ViewOptions {
                copy: cli.copy,
                raw: cli.raw,
                show_thinking: cli.show_thinking,
            },
            auth: AuthService::new(guard, config.bootstrap_timeout),
            chat: ChatService::new(backend.clone(), config.history_limit),
            search: SearchService::new(backend.clone(), config.search_top_k),
            backend,
            system_prompt: String::new(),
        })
    }

    pub async fn run(&mut self, cli: Cli) -> Result<()> {
        self.bootstrap().await;

        match cli.command.unwrap_or(Command::Repl) {
            Command::Login => self.handle_login().await,
            Command::Logout => self.handle_logout().await,
            Command::Whoami => self.handle_whoami().await,
            Command::Search { text, top_k } => {
                if !self.ensure_main().await? {
                    return Ok(());
                }
                if let Some(top_k) = top_k {
                    self.search.set_top_k(top_k);
                }
                self.handle_search(&text.join(" ")).await
            }
            Command::Chat {
                system,
                stream,
                prompt,
            } => {
                if !self.ensure_main().await? {
                    return Ok(());
                }
                self.system_prompt = system;
                let prompt = prompt.join(" ");
                if stream {
                    self.handle_stream(&prompt).await
                } else {
                    self.handle_chat(&prompt).await
                }
            }
            Command::Tools => {
                if !self.ensure_main().await? {
                    return Ok(());
                }
                self.handle_tools().await
            }
            Command::Repl => self.repl().await,
        }
    }

    async fn bootstrap(&self) {
        if self.auth.bootstrap().await == BootstrapOutcome::TimedOut {
            println!(
                "{}",
                "The identity provider did not respond. Continuing signed out.".yellow()
            );
        }
    }

    /// Resolves the main view through the route guard, running the login
    /// view first when the session is not authenticated. Returns whether the
    /// main view may be shown.
    async fn ensure_main(&self) -> Result<bool> {
        match self.auth.resolve(Route::Main).await {
            RouteDecision::Render(Route::Main) | RouteDecision::Redirect(Route::Main) => Ok(true),
            RouteDecision::Pending => {
                warn!("Session is still initialising");
                Ok(false)
            }
            RouteDecision::Redirect(Route::Login) | RouteDecision::Render(Route::Login) => {
                println!("{}", "You need to log in first.".yellow());
                self.login_view().await
            }
        }
    }

    async fn login_view(&self) -> Result<bool> {
        println!("{}", "Log in to Personal Files Assistant".bold());
        let device = self.auth.start_login().await?;
        println!(
            "Open {} and enter the code {}",
            device.verification_uri.underline(),
            device.user_code.bold().green()
        );
        if let Some(complete) = &device.verification_uri_complete {
            println!("{} {}", "Or open directly:".dimmed(), complete.underline());
        }
        println!("{}", "Waiting for approval (Ctrl-C to cancel)...".dimmed());

        tokio::select! {
            result = self.auth.complete_login(&device) => {
                let name = result?;
                println!("Logged in as {}", name.green());
                Ok(true)
            }
            _ = tokio::signal::ctrl_c() => {
                println!("{}", "Login cancelled.".yellow());
                Ok(false)
            }
        }
    }

    async fn handle_login(&self) -> Result<()> {
        match self.auth.resolve(Route::Login).await {
            RouteDecision::Redirect(Route::Main) => {
                let session = self.auth.session().await;
                println!("Already logged in as {}", render_user_badge(&session));
            }
            _ => {
                self.login_view().await?;
            }
        }
        Ok(())
    }

    async fn handle_logout(&self) -> Result<()> {
        let next = self.auth.logout().await;
        debug!("Routing to {}", next.path());
        println!("{}", "Logged out.".green());
        Ok(())
    }

    async fn handle_whoami(&self) -> Result<()> {
        let session = self.auth.session().await;
        if !session.is_authenticated() {
            println!("{}", "Not logged in.".yellow());
            return Ok(());
        }
        println!("{}", render_user_badge(&session));
        if let Some(email) = session.claims().email.as_deref() {
            println!("{}", email.dimmed());
        }
        Ok(())
    }

    async fn handle_search(&mut self, query: &str) -> Result<()> {
        let mut pending = PendingLine::show(SEARCHING_INDICATOR);
        let outcome = self.search.search(query).await;
        pending.clear();
        if outcome == SearchOutcome::Completed {
            println!(
                "{}",
                render_search_results(query, self.search.results(), self.options.raw)
            );
        }
        Ok(())
    }

    async fn handle_chat(&mut self, prompt: &str) -> Result<()> {
        let mut pending = PendingLine::show(THINKING_INDICATOR);
        let outcome = self.chat.send(prompt, &self.system_prompt).await;
        pending.clear();
        match outcome {
            ChatOutcome::Completed => {
                let answer = self.displayed_response();
                println!("{}", render_markdown(&answer));
                if self.options.copy {
                    self.copy(&answer);
                }
            }
            ChatOutcome::Failed => println!("{}", self.chat.state().response().red()),
            _ => {}
        }
        Ok(())
    }

    async fn handle_stream(&mut self, prompt: &str) -> Result<()> {
        let mut printer = StreamPrinter::new(
            self.options.show_thinking,
            PendingLine::show(THINKING_INDICATOR),
        );
        let cancel = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Ctrl-C handler unavailable: {e}");
                std::future::pending::<()>().await;
            }
        };

        let outcome = self
            .chat
            .stream(
                prompt,
                &self.system_prompt,
                |fragment| printer.push(fragment),
                cancel,
            )
            .await;
        printer.finish();

        match outcome {
            ChatOutcome::Completed => {
                let answer = self.displayed_response();
                if erase_output(printer.printed()) {
                    println!("{}", render_markdown(&answer));
                } else {
                    println!();
                }
                if self.options.copy {
                    self.copy(&answer);
                }
            }
            ChatOutcome::Failed => println!("{}", self.chat.state().response().red()),
            ChatOutcome::Aborted => println!(),
            ChatOutcome::Cancelled => println!(" {}", "[cancelled]".dimmed()),
            ChatOutcome::Ignored => {}
        }
        Ok(())
    }

    async fn handle_tools(&self) -> Result<()> {
        match self.backend.list_tools().await {
            Ok(tools) => println!("{}", render_tools(&tools)),
            Err(e) if e.is_auth_failure() => {
                println!("{}", "Your session has ended. Log in again.".yellow())
            }
            Err(e) => println!("{}", format!("Could not list tools: {e}").red()),
        }
        Ok(())
    }

    fn handle_history(&self) {
        let history = self.chat.history();
        if history.is_empty() {
            println!("{}", "No prompts yet.".dimmed());
            return;
        }
        for (i, prompt) in history.iter().enumerate() {
            println!("{:>3}. {}", i + 1, prompt);
        }
    }

    fn handle_system(&mut self, text: &str) {
        self.system_prompt = text.to_string();
        if text.is_empty() {
            println!("{}", "System instruction cleared.".dimmed());
        } else {
            println!("{}", "System instruction set.".dimmed());
        }
    }

    fn displayed_response(&self) -> String {
        let response = self.chat.state().response();
        if self.options.show_thinking {
            response.to_string()
        } else {
            strip_think_tags(response)
        }
    }

    fn copy(&self, text: &str) {
        match copy_to_clipboard(text) {
            Ok(()) => println!("{}", "Copied to clipboard.".dimmed()),
            Err(e) => println!("{}", format!("Copy failed: {e:#}").yellow()),
        }
    }

    async fn repl(&mut self) -> Result<()> {
        if !self.ensure_main().await? {
            return Ok(());
        }
        self.print_menu().await;

        loop {
            // The session can end underneath us when a refresh is rejected.
            if !self.ensure_main().await? {
                return Ok(());
            }

            let line = match ask_line(">") {
                Ok(line) => line,
                Err(e) => {
                    debug!("Input closed: {e:#}");
                    return Ok(());
                }
            };

            match parse_repl_command(&line) {
                ReplCommand::Empty => {}
                ReplCommand::Chat(prompt) => self.handle_chat(prompt).await?,
                ReplCommand::Stream(prompt) => self.handle_stream(prompt).await?,
                ReplCommand::Search(query) => self.handle_search(query).await?,
                ReplCommand::System(text) => self.handle_system(text),
                ReplCommand::History => self.handle_history(),
                ReplCommand::Tools => self.handle_tools().await?,
                ReplCommand::Copy => {
                    let answer = self.displayed_response();
                    if answer.is_empty() {
                        println!("{}", "Nothing to copy yet.".dimmed());
                    } else {
                        self.copy(&answer);
                    }
                }
                ReplCommand::Logout => {
                    self.handle_logout().await?;
                    if !ask_confirmation("Log in again?", false)? {
                        return Ok(());
                    }
                    if !self.login_view().await? {
                        return Ok(());
                    }
                    self.print_menu().await;
                }
                ReplCommand::Help => self.print_menu().await,
                ReplCommand::Exit => return Ok(()),
                ReplCommand::Unknown(name) => {
                    println!("{}", format!("Unknown command {name}, try /help").yellow())
                }
            }
        }
    }

    async fn print_menu(&self) {
        let session = self.auth.session().await;
        println!("{}", render_user_badge(&session));
        println!("{}", REPL_HELP.dimmed());
    }
}
