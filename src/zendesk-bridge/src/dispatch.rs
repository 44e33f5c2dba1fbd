//! Command dispatch: parse, route, handle, render.

use tracing::{debug, info, warn};

use crate::error::CommandError;
use crate::handlers::{CommandArgs, CommandHandlers};
use crate::messages::Reply;
use crate::parser::CommandParser;
use crate::router::VerbTable;
use crate::sink::ReplyTarget;
use crate::verbs::{Verb, help_text};

/// One slash command as delivered by the chat server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Full command line, trigger included.
    pub text: String,
    pub user_id: String,
    pub channel_id: String,
    pub response_url: Option<String>,
}

impl Invocation {
    /// Where the reply to this invocation goes.
    pub fn target(&self) -> ReplyTarget {
        ReplyTarget {
            user_id: self.user_id.clone(),
            channel_id: self.channel_id.clone(),
            response_url: self.response_url.clone(),
        }
    }
}

/// Turns invocations into replies. Never fails.
#[derive(Clone)]
pub struct Dispatcher {
    parser: CommandParser,
    table: VerbTable<Verb>,
    handlers: CommandHandlers,
}

impl Dispatcher {
    pub fn new(table: VerbTable<Verb>, handlers: CommandHandlers) -> Self {
        Self {
            parser: CommandParser::new(handlers.trigger()),
            table,
            handlers,
        }
    }

    pub fn trigger(&self) -> &str {
        self.parser.trigger()
    }

    /// Run one invocation to completion.
    pub async fn dispatch(&self, invocation: &Invocation) -> Reply {
        let line = match self.parser.parse(&invocation.text) {
            Ok(line) => line,
            Err(e) => {
                debug!(user_id = %invocation.user_id, "Not a command for us: {}", e);
                return Reply::text(help_text(self.trigger()));
            }
        };

        let args = line.args();
        let (verb, rest) = self.table.resolve(&args);
        let verb = *verb;
        info!(user_id = %invocation.user_id, verb = ?verb, "Dispatching command");

        match self
            .handlers
            .handle(verb, &invocation.user_id, CommandArgs::new(&line, rest))
            .await
        {
            Ok(reply) => reply,
            Err(err) => {
                match &err {
                    CommandError::Usage(_) | CommandError::NotConnected => {
                        debug!(user_id = %invocation.user_id, verb = ?verb, "Command rejected: {}", err);
                    }
                    CommandError::Upstream(_) | CommandError::Config(_) => {
                        warn!(user_id = %invocation.user_id, verb = ?verb, "Command failed: {}", err);
                    }
                }
                Reply::text(err.user_message(self.trigger()))
            }
        }
    }
}
