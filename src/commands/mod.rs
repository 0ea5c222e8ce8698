/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes four top-level command modules:

- `chat`: Interactive chat session
- `ask`: One question, one streamed answer
- `history`: Print a stored conversation
- `endpoint`: Print the computed chat endpoint URL

These handlers are intentionally small and use the library components:
the chat client, the message store and the configuration.
*/

use crate::commands::render::{disconnected_notice, print_transcript, Renderer};
use crate::commands::session::ChatSession;
use crate::commands::special_commands::{parse_special_command, print_help, SpecialCommand};
use crate::config::Config;
use crate::error::Result;

// Special commands parser for interactive chat
pub mod special_commands;

// Client and store wiring shared by the handlers
pub mod session;

// Terminal output
pub mod render;

// One-shot question
pub mod ask;

// Conversation history
pub mod history;

// Chat command handler
pub mod chat {
    //! Interactive chat mode handler.
    //!
    //! Connects a [`ChatSession`], reads lines on a dedicated thread with
    //! `rustyline`, and multiplexes user input with inbound session events
    //! so answers stream while the prompt stays usable (e.g. for `/stop`).

    use super::*;
    use colored::Colorize;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;
    use tokio::sync::mpsc;

    /// Input read from the terminal.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum InputEvent {
        /// A complete line
        Line(String),
        /// CTRL-C
        Interrupted,
        /// CTRL-D
        Eof,
    }

    /// What the loop should do after handling input.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Flow {
        /// Keep reading
        Continue,
        /// Leave the session
        Exit,
    }

    /// Start interactive chat mode
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `session_id` - Session to resume; `None` starts a fresh one using
    ///   the configured symbol and model
    ///
    /// # Errors
    ///
    /// Returns an error if the first connection cannot be established or
    /// the terminal cannot be initialized.
    ///
    /// # Examples
    ///
    /// ```
    /// use stockchat::commands::chat;
    /// use stockchat::config::Config;
    ///
    /// // In application code:
    /// // chat::run_chat(Config::default(), None).await?;
    /// ```
    pub async fn run_chat(config: Config, session_id: Option<String>) -> Result<()> {
        let mut session = ChatSession::from_config(&config)?;
        let mut renderer = Renderer::new(config.chat.show_thoughts);
        let mut stdout = std::io::stdout();

        print_welcome_banner(&config);

        let confirmed = session
            .client
            .connect(
                session_id.as_deref(),
                config.chat.symbol.as_deref(),
                config.chat.model.as_deref(),
            )
            .await?;
        tracing::info!("Chat session {} ready", confirmed);
        if session_id.is_some() {
            session.client.get_history(config.chat.history_limit).await;
        }

        let mut input = spawn_input_reader()?;

        loop {
            tokio::select! {
                line = input.recv() => match line {
                    Some(InputEvent::Line(line)) => {
                        let flow = handle_line(&mut session, &mut renderer, &config, &line).await?;
                        if flow == Flow::Exit {
                            break;
                        }
                    }
                    Some(InputEvent::Interrupted) => {
                        if session.store.is_generating() {
                            session.client.cancel_generation().await;
                        } else {
                            println!("CTRL-C");
                            break;
                        }
                    }
                    Some(InputEvent::Eof) | None => {
                        println!("CTRL-D");
                        break;
                    }
                },
                event = session.next_event() => match event {
                    Some(event) => {
                        renderer.render(&session.store, &event, &mut stdout)?;
                        if session.take_resync() {
                            session.client.get_history(config.chat.history_limit).await;
                        }
                    }
                    None => break,
                },
            }
        }

        session.client.disconnect().await;
        println!("Goodbye!");
        Ok(())
    }

    /// Read terminal lines on a dedicated thread.
    ///
    /// The thread stops once the receiver is dropped and the next line has
    /// been read.
    fn spawn_input_reader() -> Result<mpsc::UnboundedReceiver<InputEvent>> {
        let mut rl = DefaultEditor::new()?;
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::spawn(move || loop {
            let event = match rl.readline("you> ") {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        let _ = rl.add_history_entry(line.as_str());
                    }
                    InputEvent::Line(line)
                }
                Err(ReadlineError::Interrupted) => InputEvent::Interrupted,
                Err(ReadlineError::Eof) => InputEvent::Eof,
                Err(err) => {
                    tracing::error!("Readline error: {:?}", err);
                    InputEvent::Eof
                }
            };
            let stop = event == InputEvent::Eof;
            if tx.send(event).is_err() || stop {
                break;
            }
        });
        Ok(rx)
    }

    /// Handle one line of user input.
    ///
    /// # Errors
    ///
    /// Returns an error only if writing to the terminal fails.
    pub async fn handle_line(
        session: &mut ChatSession,
        renderer: &mut Renderer,
        config: &Config,
        line: &str,
    ) -> Result<Flow> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Flow::Continue);
        }

        let command = match parse_special_command(trimmed) {
            Ok(command) => command,
            Err(e) => {
                eprintln!("{}", e.to_string().red());
                return Ok(Flow::Continue);
            }
        };

        let client = session.client.clone();
        let sent = match command {
            SpecialCommand::None => {
                if session.store.is_generating() {
                    println!(
                        "{}",
                        "An answer is still streaming; wait for it or type /stop.".yellow()
                    );
                    return Ok(Flow::Continue);
                }
                if !client.is_connected() {
                    print_not_connected(&client);
                    return Ok(Flow::Continue);
                }
                session.store.begin_send(trimmed);
                let sent = client.send_message(trimmed).await;
                if !sent {
                    session.store.fail_active("not sent: lost connection to the chat server");
                }
                sent
            }
            SpecialCommand::Stop => {
                let sent = client.cancel_generation().await;
                if !sent {
                    // Nobody is left to confirm the cancel.
                    session.store.fail_active("stopped while disconnected");
                }
                sent
            }
            SpecialCommand::Regenerate(message_id) => client.regenerate(message_id).await,
            SpecialCommand::Edit {
                message_id,
                content,
            } => client.edit_message(message_id, &content).await,
            SpecialCommand::History(limit) => {
                client
                    .get_history(limit.unwrap_or(config.chat.history_limit))
                    .await
            }
            SpecialCommand::Session(id) => {
                *renderer = Renderer::new(config.chat.show_thoughts);
                match session.switch_session(&id).await {
                    Ok(confirmed) => {
                        tracing::info!("Switched to session {}", confirmed);
                        client.get_history(config.chat.history_limit).await
                    }
                    Err(e) => {
                        eprintln!("{}", format!("Could not switch session: {e}").red());
                        return Ok(Flow::Continue);
                    }
                }
            }
            SpecialCommand::Messages => {
                print_transcript(session.store.messages(), true, &mut std::io::stdout())?;
                return Ok(Flow::Continue);
            }
            SpecialCommand::ShowStatus => {
                print_status_display(session);
                return Ok(Flow::Continue);
            }
            SpecialCommand::Help => {
                print_help();
                return Ok(Flow::Continue);
            }
            SpecialCommand::Exit => return Ok(Flow::Exit),
        };

        if !sent {
            print_not_connected(&client);
        }
        Ok(Flow::Continue)
    }

    fn print_not_connected(client: &crate::chat::ChatClient) {
        let attempts = client.reconnect_attempts();
        let notice = if attempts > 0 {
            disconnected_notice(attempts)
        } else {
            "Not connected to the chat server. Use /session <id> to reconnect.".to_string()
        };
        println!("{}", notice.red());
    }

    /// Display welcome banner at the start of interactive chat mode
    fn print_welcome_banner(config: &Config) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║           StockChat Interactive Session - Welcome!           ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");
        println!("Server: {}", config.server.page_url.cyan());
        if let Some(symbol) = &config.chat.symbol {
            println!("Symbol: {}", symbol.green().bold());
        }
        if let Some(model) = &config.chat.model {
            println!("Model:  {}", model);
        }
        println!("\nType '/help' for available commands, 'exit' to quit\n");
    }

    /// Display connection and session status
    ///
    /// This is called when the user types the '/status' command.
    fn print_status_display(session: &ChatSession) {
        let info = session.client.session();
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    StockChat Session Status                  ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");
        println!("Connection:   {}", session.client.connection_state());
        println!(
            "Session:      {}",
            info.session_id.as_deref().unwrap_or("(none)")
        );
        println!("Symbol:       {}", info.symbol.as_deref().unwrap_or("(none)"));
        println!("Model:        {}", info.model.as_deref().unwrap_or("(default)"));
        println!("Reconnects:   {}", session.client.reconnect_attempts());
        println!("Messages:     {}", session.store.messages().len());
        println!(
            "Generating:   {}",
            if session.store.is_generating() {
                "yes"
            } else {
                "no"
            }
        );
        println!();
    }
}

// Endpoint inspection
pub mod endpoint {
    //! Print the endpoint URL a session would connect to.

    use super::*;

    /// Compute the endpoint URL for the configured server.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured page URL is invalid.
    pub fn endpoint_url(config: &Config, session_id: Option<&str>) -> Result<url::Url> {
        config.endpoint_builder()?.build(
            session_id,
            config.chat.symbol.as_deref(),
            config.chat.model.as_deref(),
        )
    }

    /// Print the endpoint URL on stdout.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured page URL is invalid.
    pub fn print_endpoint(config: &Config, session_id: Option<&str>) -> Result<()> {
        println!("{}", endpoint_url(config, session_id)?);
        Ok(())
    }

}
