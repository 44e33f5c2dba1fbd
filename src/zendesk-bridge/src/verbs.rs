//! The command verbs understood by the bridge.

use zendesk_api::Visibility;

use crate::credentials::Requirement;
use crate::router::{RouterError, VerbTable};

/// A command variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Status,
    Details,
    Latest(Visibility),
    Update(Visibility),
    Connect,
    Disconnect,
    Help,
}

impl Verb {
    /// Every verb reachable through the verb table.
    pub const ALL: [Verb; 9] = [
        Verb::Status,
        Verb::Details,
        Verb::Latest(Visibility::Private),
        Verb::Latest(Visibility::Public),
        Verb::Update(Visibility::Private),
        Verb::Update(Visibility::Public),
        Verb::Connect,
        Verb::Disconnect,
        Verb::Help,
    ];

    /// Words the user types to select this verb.
    pub fn path(self) -> &'static [&'static str] {
        match self {
            Verb::Status => &["status"],
            Verb::Details => &["details"],
            Verb::Latest(Visibility::Private) => &["latest", "private"],
            Verb::Latest(Visibility::Public) => &["latest", "public"],
            Verb::Update(Visibility::Private) => &["update", "private"],
            Verb::Update(Visibility::Public) => &["update", "public"],
            Verb::Connect => &["connect"],
            Verb::Disconnect => &["disconnect"],
            Verb::Help => &["help"],
        }
    }

    /// Whose credential a verb acts under, if it talks to Zendesk at all.
    ///
    /// Writes always carry the caller's identity so they land in the
    /// caller's audit trail. Reads fall back to the service account.
    pub fn requirement(self) -> Option<Requirement> {
        match self {
            Verb::Status | Verb::Details | Verb::Latest(_) => Some(Requirement::PreferUser),
            Verb::Update(_) => Some(Requirement::RequireUser),
            Verb::Connect | Verb::Disconnect | Verb::Help => None,
        }
    }

    /// Build the standard verb table with [`Verb::Help`] as the fallback.
    pub fn table() -> Result<VerbTable<Verb>, RouterError> {
        Verb::ALL
            .iter()
            .try_fold(VerbTable::builder(Verb::Help), |builder, verb| {
                builder.register(verb.path(), *verb)
            })
            .map(|builder| builder.build())
    }
}

/// Static command reference shown for `help` and anything unrecognized.
pub fn help_text(trigger: &str) -> String {
    let mut text = String::from("###### Zendesk - Slash Command Help\n\n");
    let lines = [
        ("status <case-number>", "Retrieve the current status of a case"),
        ("details <case-number>", "Return details of the case"),
        (
            "latest private <case-number>",
            "Retrieve the last internal comment posted to a case",
        ),
        (
            "latest public <case-number>",
            "Retrieve the last public comment posted to a case",
        ),
        (
            "update private <case-number> <comment>",
            "Post an internal comment to a case and notify agents",
        ),
        (
            "update public <case-number> <comment>",
            "Post a public comment to a case and notify agents",
        ),
        ("connect", "Connect your Zendesk account"),
        ("disconnect", "Disconnect your Zendesk account"),
        ("help", "Show help"),
    ];
    for (usage, description) in lines {
        text.push_str(&format!("* `{} {}` - {}\n", trigger, usage, description));
    }
    text
}
