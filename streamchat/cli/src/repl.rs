//! Interactive Loop
//!
//! Reads stdin lines and transcript events in one `tokio::select!` loop, so a
//! line typed while an answer is streaming is handled immediately (and, under
//! the default busy policy, preempts the running turn).
//!
//! Plain lines are sent to the active bot. Lines starting with `/` are
//! commands; profile edits go to a draft that only `/save` persists.

use std::io::{self, Write};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use streamchat_core::prompt::{
    instruction_tag, personality, INSTRUCTION_TAGS, NO_PRESET, PERSONALITIES,
};
use streamchat_core::{
    ContextKey, MessageId, MessageRole, PromptProfile, TranscriptEvent, TurnOrchestrator,
};

const HELP: &str = "\
Commands:
  /bots                 list bots
  /use <key>            switch bot
  /reset                clear this bot's conversation
  /cancel               stop the current answer
  /history              show this bot's conversation
  /prompt               show the profile and compiled prompt
  /preset <key>         choose a preset (\"none\" clears)
  /personality <key>    choose a personality
  /tag <key>            toggle an instruction tag
  /instructions <text>  set custom instructions
  /nickname <text>      set your nickname
  /profession <text>    set your profession
  /about <text>         set details about you
  /save                 save the edited profile
  /discard              drop unsaved profile edits
  /quit                 exit";

// =============================================================================
// Commands
// =============================================================================

/// One parsed input line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Text for the active bot
    Say(String),
    Bots,
    Use(String),
    Reset,
    Cancel,
    History,
    Prompt,
    Preset(String),
    Personality(String),
    Tag(String),
    Instructions(String),
    Nickname(String),
    Profession(String),
    About(String),
    Save,
    Discard,
    Help,
    Quit,
    /// A `/word` that is not a command
    Unknown(String),
}

/// Parse an input line
pub fn parse_command(line: &str) -> Command {
    let Some(rest) = line.trim().strip_prefix('/') else {
        return Command::Say(line.to_string());
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim().to_string()),
        None => (rest, String::new()),
    };

    match name {
        "bots" => Command::Bots,
        "use" => Command::Use(arg),
        "reset" => Command::Reset,
        "cancel" => Command::Cancel,
        "history" => Command::History,
        "prompt" => Command::Prompt,
        "preset" => Command::Preset(arg),
        "personality" => Command::Personality(arg),
        "tag" => Command::Tag(arg),
        "instructions" => Command::Instructions(arg),
        "nickname" => Command::Nickname(arg),
        "profession" => Command::Profession(arg),
        "about" => Command::About(arg),
        "save" => Command::Save,
        "discard" => Command::Discard,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => Command::Unknown(other.to_string()),
    }
}

// =============================================================================
// Rendering
// =============================================================================

/// Turns transcript events into terminal text for the active context
///
/// Content arrives as full replacements; the renderer prints only the part
/// not yet on screen, or the whole text on a fresh line when it diverges.
#[derive(Debug, Default)]
pub struct Renderer {
    streaming: Option<(MessageId, String)>,
}

impl Renderer {
    /// Forget any in-progress answer (after switching bots)
    pub fn clear(&mut self) {
        self.streaming = None;
    }

    /// Render one event if it belongs to `active`
    pub fn render(
        &mut self,
        event: &TranscriptEvent,
        active: &ContextKey,
        out: &mut impl Write,
    ) -> io::Result<()> {
        if event.context() != active {
            return Ok(());
        }

        match event {
            TranscriptEvent::MessageAdded { message, .. } if message.role == MessageRole::Assistant => {
                self.finish_line(out)?;
                write!(out, "bot> ")?;
                self.streaming = Some((message.id, String::new()));
            }
            TranscriptEvent::ContentReplaced {
                message_id, content, ..
            } => {
                if let Some((id, shown)) = self.streaming.as_mut() {
                    if *id == *message_id {
                        if let Some(suffix) = content.strip_prefix(shown.as_str()) {
                            write!(out, "{suffix}")?;
                        } else {
                            write!(out, "\nbot> {content}")?;
                        }
                        shown.clone_from(content);
                    }
                }
            }
            TranscriptEvent::MessageRemoved { message_id, .. } => {
                if self.is_streaming(*message_id) {
                    writeln!(out, " [cancelled]")?;
                    self.streaming = None;
                }
            }
            TranscriptEvent::TurnFinished { message_id, .. } => {
                if self.is_streaming(*message_id) {
                    writeln!(out)?;
                    self.streaming = None;
                }
            }
            TranscriptEvent::ContextReset { context } => {
                self.finish_line(out)?;
                writeln!(out, "[{context}: conversation cleared]")?;
            }
            TranscriptEvent::ContinuationUpdated { context, token } => {
                debug!(context = %context, token = %token, "Continuation token updated");
            }
            TranscriptEvent::MessageAdded { .. } => {}
        }
        out.flush()
    }

    fn is_streaming(&self, message_id: MessageId) -> bool {
        matches!(&self.streaming, Some((id, _)) if *id == message_id)
    }

    fn finish_line(&mut self, out: &mut impl Write) -> io::Result<()> {
        if self.streaming.take().is_some() {
            writeln!(out)?;
        }
        Ok(())
    }
}

// =============================================================================
// Loop
// =============================================================================

/// The interactive session
pub struct Repl {
    orchestrator: TurnOrchestrator,
    context: ContextKey,
    draft: Option<PromptProfile>,
    renderer: Renderer,
}

impl Repl {
    /// Activate the starting context and build the loop
    pub fn new(orchestrator: TurnOrchestrator, context: ContextKey) -> Result<Self> {
        orchestrator
            .sessions()
            .activate(&context)
            .with_context(|| format!("Failed to open bot {context}"))?;
        Ok(Self {
            orchestrator,
            context,
            draft: None,
            renderer: Renderer::default(),
        })
    }

    /// Run until `/quit` or end of input
    pub async fn run(&mut self) -> Result<()> {
        let mut events = self.orchestrator.sessions().subscribe();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut out = io::stdout();

        self.banner(&mut out)?;

        loop {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    signal.context("Failed to listen for Ctrl-C")?;
                    if !self.interrupt(&mut out)? {
                        break;
                    }
                }
                line = lines.next_line() => {
                    let Some(line) = line.context("Failed to read stdin")? else {
                        break;
                    };
                    if !self.handle_line(&line, &mut out)? {
                        break;
                    }
                }
                event = events.recv() => match event {
                    Ok(event) => self.renderer.render(&event, &self.context, &mut out)?,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Transcript events dropped, terminal view may be stale");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        self.orchestrator.cancel(&self.context);
        Ok(())
    }

    /// Ctrl-C: cancel the running turn, or stop when there is none
    pub fn interrupt(&mut self, out: &mut impl Write) -> Result<bool> {
        if self.orchestrator.cancel(&self.context) {
            writeln!(out, "[cancelled]")?;
            out.flush()?;
            return Ok(true);
        }
        debug!(context = %self.context, "Interrupted while idle, stopping");
        Ok(false)
    }

    /// Handle one line; returns false to stop
    pub fn handle_line(&mut self, line: &str, out: &mut impl Write) -> Result<bool> {
        match parse_command(line) {
            Command::Quit => return Ok(false),
            command => {
                if let Err(e) = self.execute(command, out) {
                    writeln!(out, "error: {e:#}")?;
                }
            }
        }
        Ok(true)
    }

    fn execute(&mut self, command: Command, out: &mut impl Write) -> Result<()> {
        match command {
            Command::Say(text) => {
                let submitted = self.orchestrator.submit(&self.context, &text)?;
                if submitted.is_none() && !text.trim().is_empty() {
                    writeln!(out, "[{} is still answering; /cancel first]", self.context)?;
                }
            }
            Command::Bots => self.list_bots(out)?,
            Command::Use(key) => self.switch(ContextKey::new(key), out)?,
            Command::Reset => self.orchestrator.reset(&self.context)?,
            Command::Cancel => {
                if !self.orchestrator.cancel(&self.context) {
                    writeln!(out, "[nothing to cancel]")?;
                }
            }
            Command::History => self.history(out)?,
            Command::Prompt => self.show_prompt(out)?,
            Command::Preset(key) => {
                let family = self.draft_mut().preset_family;
                if key != NO_PRESET && family.preset(&key).is_none() {
                    let keys: Vec<&str> = family.presets().iter().map(|p| p.key).collect();
                    writeln!(out, "unknown preset; choose one of: {}", keys.join(", "))?;
                } else {
                    self.draft_mut().select_preset(&key);
                }
            }
            Command::Personality(key) => {
                if personality(&key).is_some() {
                    self.draft_mut().personality_key = key;
                } else {
                    let keys: Vec<&str> = PERSONALITIES.iter().map(|p| p.key).collect();
                    writeln!(out, "unknown personality; choose one of: {}", keys.join(", "))?;
                }
            }
            Command::Tag(key) => {
                if instruction_tag(&key).is_some() {
                    self.draft_mut().toggle_tag(&key);
                } else {
                    let keys: Vec<&str> = INSTRUCTION_TAGS.iter().map(|t| t.key).collect();
                    writeln!(out, "unknown tag; choose from: {}", keys.join(", "))?;
                }
            }
            Command::Instructions(text) => self.draft_mut().custom_instructions = text,
            Command::Nickname(text) => self.draft_mut().nickname = text,
            Command::Profession(text) => self.draft_mut().profession = text,
            Command::About(text) => self.draft_mut().about_details = text,
            Command::Save => match self.draft.take() {
                Some(draft) => match self.orchestrator.save_profile(&self.context, draft.clone()) {
                    Ok(compiled) => writeln!(out, "[saved]\n{compiled}")?,
                    Err(e) => {
                        self.draft = Some(draft);
                        return Err(e.into());
                    }
                },
                None => writeln!(out, "[no unsaved changes]")?,
            },
            Command::Discard => {
                if self.draft.take().is_some() {
                    writeln!(out, "[changes discarded]")?;
                }
            }
            Command::Help => writeln!(out, "{HELP}")?,
            Command::Unknown(name) => writeln!(out, "unknown command /{name}; try /help")?,
            Command::Quit => {}
        }
        out.flush()?;
        Ok(())
    }

    fn banner(&self, out: &mut impl Write) -> Result<()> {
        let name = self
            .orchestrator
            .sessions()
            .registry()
            .get(&self.context)
            .map_or_else(|| self.context.to_string(), |bot| bot.name.clone());
        writeln!(out, "Talking to {name}. /help for commands.")?;
        Ok(())
    }

    fn list_bots(&self, out: &mut impl Write) -> Result<()> {
        for bot in self.orchestrator.sessions().registry().iter() {
            let marker = if bot.key == self.context { "*" } else { " " };
            writeln!(out, "{marker} {:<20} {} - {}", bot.key.as_str(), bot.name, bot.description)?;
        }
        Ok(())
    }

    fn switch(&mut self, context: ContextKey, out: &mut impl Write) -> Result<()> {
        if !self.orchestrator.sessions().registry().contains(&context) {
            writeln!(out, "unknown bot {context}; see /bots")?;
            return Ok(());
        }
        if self.draft.take().is_some() {
            writeln!(out, "[unsaved profile changes discarded]")?;
        }
        self.orchestrator.sessions().activate(&context)?;
        self.context = context;
        self.renderer.clear();
        self.banner(out)?;
        self.history(out)
    }

    fn history(&self, out: &mut impl Write) -> Result<()> {
        for message in self.orchestrator.sessions().messages_for(&self.context) {
            let who = match message.role {
                MessageRole::User => "you",
                MessageRole::Assistant => "bot",
            };
            writeln!(out, "{who}> {}", message.content)?;
        }
        Ok(())
    }

    fn show_prompt(&self, out: &mut impl Write) -> Result<()> {
        let sessions = self.orchestrator.sessions();
        let (label, profile) = match &self.draft {
            Some(draft) => ("draft (unsaved)", draft.clone()),
            None => ("saved", self.saved_profile()),
        };

        writeln!(out, "Profile ({label}):")?;
        writeln!(out, "  preset:       {}", profile.preset_key)?;
        writeln!(out, "  personality:  {}", profile.personality_key)?;
        writeln!(out, "  tags:         {}", profile.instruction_tag_keys.join(", "))?;
        writeln!(out, "  instructions: {}", profile.custom_instructions)?;
        writeln!(out, "  nickname:     {}", profile.nickname)?;
        writeln!(out, "  profession:   {}", profile.profession)?;
        writeln!(out, "  about:        {}", profile.about_details)?;

        let compiled = profile.compiled();
        let effective = sessions
            .registry()
            .get(&self.context)
            .and_then(|bot| bot.effective_prompt(&compiled));
        match effective {
            Some(prompt) => writeln!(out, "Prompt sent:\n{prompt}")?,
            None => writeln!(out, "Prompt sent: (none)")?,
        }
        Ok(())
    }

    fn saved_profile(&self) -> PromptProfile {
        let sessions = self.orchestrator.sessions();
        sessions.profile(&self.context).unwrap_or_else(|| {
            let family = sessions
                .registry()
                .get(&self.context)
                .map(|bot| bot.preset_family)
                .unwrap_or_default();
            PromptProfile::new(family)
        })
    }

    fn draft_mut(&mut self) -> &mut PromptProfile {
        if self.draft.is_none() {
            self.draft = Some(self.saved_profile());
        }
        self.draft.get_or_insert_with(PromptProfile::default)
    }
}
