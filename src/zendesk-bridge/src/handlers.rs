//! Per-verb command handlers.
//!
//! Handlers validate their arguments before resolving credentials, so a
//! malformed command never reaches Zendesk.

use std::sync::Arc;

use tracing::{debug, info};
use zendesk_api::{Comment, TicketId, TicketService, Visibility};

use crate::credentials::{CredentialResolver, Principal};
use crate::error::CommandError;
use crate::factory::TicketServiceFactory;
use crate::messages::{Reply, ticket_attachment};
use crate::oauth::OAuthFlow;
use crate::parser::ParsedLine;
use crate::verbs::{Verb, help_text};

/// Path of the browser entry point of the OAuth flow.
pub const CONNECT_PATH: &str = "/user/connect";

/// Arguments left over after verb resolution.
#[derive(Debug, Clone, Copy)]
pub struct CommandArgs<'a> {
    line: &'a ParsedLine,
    args: &'a [&'a str],
    /// Token index of `args[0]` within `line`.
    first_token: usize,
}

impl<'a> CommandArgs<'a> {
    /// `args` must be a suffix of `line`'s argument tokens.
    pub fn new(line: &'a ParsedLine, args: &'a [&'a str]) -> Self {
        let first_token = line.tokens().len().saturating_sub(args.len());
        Self {
            line,
            args,
            first_token,
        }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&'a str> {
        self.args.get(index).copied()
    }

    /// Raw text following argument `index`.
    pub fn text_after(&self, index: usize) -> &'a str {
        self.line.text_after(self.first_token + index)
    }
}

/// Everything the handlers need.
#[derive(Clone)]
pub struct CommandHandlers {
    resolver: CredentialResolver,
    factory: Arc<dyn TicketServiceFactory>,
    oauth: OAuthFlow,
    trigger: String,
    public_base: String,
}

impl CommandHandlers {
    pub fn new(
        resolver: CredentialResolver,
        factory: Arc<dyn TicketServiceFactory>,
        oauth: OAuthFlow,
        trigger: impl Into<String>,
        public_base: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            factory,
            oauth,
            trigger: trigger.into(),
            public_base: public_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    /// Run `verb` for `user_id`.
    pub async fn handle(
        &self,
        verb: Verb,
        user_id: &str,
        args: CommandArgs<'_>,
    ) -> Result<Reply, CommandError> {
        match verb {
            Verb::Status => self.status(user_id, args).await,
            Verb::Details => self.details(user_id, args).await,
            Verb::Latest(visibility) => self.latest(user_id, visibility, args).await,
            Verb::Update(visibility) => self.update(user_id, visibility, args).await,
            Verb::Connect => Ok(self.connect(args)),
            Verb::Disconnect => Ok(self.disconnect(user_id, args).await),
            Verb::Help => Ok(self.help()),
        }
    }

    fn help(&self) -> Reply {
        Reply::text(help_text(&self.trigger))
    }

    async fn status(&self, user_id: &str, args: CommandArgs<'_>) -> Result<Reply, CommandError> {
        let id = self.single_ticket_id(args, "status")?;
        let service = self.service(user_id, Verb::Status).await?;

        let view = service.fetch_ticket(id).await?;
        Ok(match view.ticket.status {
            Some(status) => Reply::text(status),
            None => Reply::text(format!("Ticket #{} has no status.", id)),
        })
    }

    async fn details(&self, user_id: &str, args: CommandArgs<'_>) -> Result<Reply, CommandError> {
        let id = self.single_ticket_id(args, "details")?;
        let service = self.service(user_id, Verb::Details).await?;

        let view = service.fetch_ticket(id).await?;
        let organization = match view.ticket.organization_id {
            Some(org_id) => Some(service.fetch_organization(org_id).await?),
            None => None,
        };

        let origin = self.resolver.service_origin()?;
        Ok(Reply::attachment(ticket_attachment(
            &view,
            organization.as_ref(),
            &origin,
        )))
    }

    async fn latest(
        &self,
        user_id: &str,
        visibility: Visibility,
        args: CommandArgs<'_>,
    ) -> Result<Reply, CommandError> {
        let usage = format!("latest {}", visibility.as_str());
        let id = self.single_ticket_id(args, &usage)?;
        let service = self.service(user_id, Verb::Latest(visibility)).await?;

        let comments = service.list_comments(id).await?;
        Ok(match latest_with_visibility(&comments, visibility) {
            Some(comment) => Reply::text(comment.body.clone().unwrap_or_default()),
            None => Reply::text(format!(
                "No {} comment found on ticket #{}.",
                visibility.as_str(),
                id
            )),
        })
    }

    async fn update(
        &self,
        user_id: &str,
        visibility: Visibility,
        args: CommandArgs<'_>,
    ) -> Result<Reply, CommandError> {
        let usage = || {
            CommandError::Usage(format!(
                "Please specify a case number and a comment in the form `{} update {} <case-number> <comment>`.",
                self.trigger,
                visibility.as_str()
            ))
        };

        let raw_id = args.get(0).ok_or_else(usage)?;
        let id = parse_ticket_id(raw_id)?;
        let body = args.text_after(0);
        if body.is_empty() {
            return Err(usage());
        }

        let service = self.service(user_id, Verb::Update(visibility)).await?;
        let ticket = service.post_comment(id, body, visibility).await?;

        info!(user_id, ticket_id = ticket.id, visibility = visibility.as_str(), "Comment added");
        let label = match visibility {
            Visibility::Private => "Private",
            Visibility::Public => "Public",
        };
        Ok(Reply::text(format!(
            "{} comment [{}] was added to ticket #{}",
            label, body, ticket.id
        )))
    }

    fn connect(&self, args: CommandArgs<'_>) -> Reply {
        if !args.is_empty() {
            return self.help();
        }
        Reply::text(format!(
            "[Click here to link your Zendesk account]({}{})",
            self.public_base, CONNECT_PATH
        ))
    }

    async fn disconnect(&self, user_id: &str, args: CommandArgs<'_>) -> Reply {
        if !args.is_empty() {
            return self.help();
        }
        if self.oauth.disconnect(user_id).await {
            Reply::text("Your Zendesk account has been disconnected.")
        } else {
            Reply::text("Your Zendesk account is not connected.")
        }
    }

    /// Exactly one numeric argument.
    fn single_ticket_id(&self, args: CommandArgs<'_>, usage: &str) -> Result<TicketId, CommandError> {
        match (args.len(), args.get(0)) {
            (1, Some(raw)) => parse_ticket_id(raw),
            _ => Err(CommandError::Usage(format!(
                "Please specify a case number in the form `{} {} <case-number>`.",
                self.trigger, usage
            ))),
        }
    }

    async fn service(
        &self,
        user_id: &str,
        verb: Verb,
    ) -> Result<Arc<dyn TicketService>, CommandError> {
        let Some(requirement) = verb.requirement() else {
            return Err(CommandError::Config(format!(
                "`{}` does not use Zendesk",
                verb.path().join(" ")
            )));
        };

        let handle = self.resolver.resolve(user_id, requirement).await?;
        let principal = match handle.principal() {
            Principal::ServiceAccount => "service_account",
            Principal::User(_) => "user",
        };
        debug!(user_id, principal, verb = ?verb, "Resolved Zendesk credential");

        self.factory
            .build(&handle)
            .map_err(|e| CommandError::Config(e.to_string()))
    }
}

fn parse_ticket_id(raw: &str) -> Result<TicketId, CommandError> {
    raw.parse::<TicketId>()
        .map_err(|_| CommandError::Usage(format!("`{}` is not a valid case number.", raw)))
}

/// Newest comment with the given visibility.
fn latest_with_visibility(comments: &[Comment], visibility: Visibility) -> Option<&Comment> {
    comments
        .iter()
        .rev()
        .find(|comment| comment.visibility() == visibility)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::credentials::{
        AuthorizedClientHandle, CredentialStore, MemoryCredentialStore, StoredToken,
    };
    use crate::oauth::OAuthSettings;
    use crate::parser::CommandParser;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use zendesk_api::{
        ApiError, ApiResult, Credential, Organization, Ticket, TicketUpdate, TicketView, User,
    };

    #[derive(Default)]
    struct MockService {
        calls: AtomicUsize,
        comments: Vec<Comment>,
        updates: Mutex<Vec<(TicketId, TicketUpdate)>>,
        fail_with: Option<u16>,
    }

    #[async_trait]
    impl TicketService for MockService {
        async fn fetch_ticket(&self, id: TicketId) -> ApiResult<TicketView> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(status) = self.fail_with {
                return Err(ApiError::Http {
                    status,
                    body: "RecordNotFound".to_string(),
                });
            }
            Ok(TicketView {
                ticket: Ticket {
                    id,
                    subject: Some("Broken widget".to_string()),
                    status: Some("open".to_string()),
                    requester_id: Some(7),
                    organization_id: Some(3),
                    ..Default::default()
                },
                users: vec![User {
                    id: 7,
                    name: Some("Rita".to_string()),
                    email: None,
                }],
            })
        }

        async fn fetch_organization(&self, id: u64) -> ApiResult<Organization> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Organization {
                id,
                name: Some("Acme".to_string()),
            })
        }

        async fn list_comments(&self, _id: TicketId) -> ApiResult<Vec<Comment>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.comments.clone())
        }

        async fn update_ticket(&self, id: TicketId, update: &TicketUpdate) -> ApiResult<Ticket> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.updates.lock().unwrap().push((id, update.clone()));
            Ok(Ticket {
                id,
                ..Default::default()
            })
        }
    }

    struct MockFactory {
        service: Arc<MockService>,
        builds: AtomicUsize,
        principals: Mutex<Vec<Principal>>,
    }

    impl TicketServiceFactory for MockFactory {
        fn build(&self, handle: &AuthorizedClientHandle) -> ApiResult<Arc<dyn TicketService>> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            self.principals
                .lock()
                .unwrap()
                .push(handle.principal().clone());
            let service: Arc<dyn TicketService> = self.service.clone();
            Ok(service)
        }
    }

    struct Fixture {
        handlers: CommandHandlers,
        factory: Arc<MockFactory>,
        store: Arc<MemoryCredentialStore>,
        parser: CommandParser,
    }

    impl Fixture {
        fn new(service: MockService, shared: bool) -> Self {
            let mut config = BridgeConfig::default();
            config.zendesk.url = "https://acme.zendesk.com".to_string();
            config.zendesk.client_secret = Some("s3cret".to_string());
            config.public_url = "https://chat.example.com/plugins/zendesk".to_string();

            let store = Arc::new(MemoryCredentialStore::new());
            let mut resolver = CredentialResolver::new(store.clone(), &config.zendesk.url);
            if shared {
                resolver = resolver.with_shared_credential(Credential::basic("svc", "pw"));
            }
            let factory = Arc::new(MockFactory {
                service: Arc::new(service),
                builds: AtomicUsize::new(0),
                principals: Mutex::new(Vec::new()),
            });
            let oauth = OAuthFlow::new(
                OAuthSettings::from_config(&config).unwrap(),
                reqwest::Client::new(),
                store.clone(),
            );
            let handlers = CommandHandlers::new(
                resolver,
                factory.clone(),
                oauth,
                "/zendesk",
                config.public_base(),
            );
            Self {
                handlers,
                factory,
                store,
                parser: CommandParser::new("/zendesk"),
            }
        }

        async fn run(&self, verb: Verb, user: &str, raw: &str) -> Result<Reply, CommandError> {
            let line = self.parser.parse(raw).unwrap();
            let all = line.args();
            let table = Verb::table().unwrap();
            let (resolved, rest) = table.resolve(&all);
            assert_eq!(*resolved, verb);
            self.handlers
                .handle(verb, user, CommandArgs::new(&line, rest))
                .await
        }

        fn service_calls(&self) -> usize {
            self.factory.service.calls.load(Ordering::SeqCst)
        }
    }

    fn comment(id: u64, body: &str, public: bool) -> Comment {
        Comment {
            id,
            body: Some(body.to_string()),
            public,
            author_id: None,
            created_at: None,
        }
    }

    #[tokio::test]
    async fn test_status_non_numeric_makes_no_call() {
        let fx = Fixture::new(MockService::default(), true);
        let err = fx
            .run(Verb::Status, "u1", "/zendesk status abc")
            .await
            .unwrap_err();

        assert!(matches!(err, CommandError::Usage(ref m) if m.contains("`abc`")));
        assert_eq!(fx.factory.builds.load(Ordering::SeqCst), 0);
        assert_eq!(fx.service_calls(), 0);
    }

    #[tokio::test]
    async fn test_status_arity() {
        let fx = Fixture::new(MockService::default(), true);
        for raw in ["/zendesk status", "/zendesk status 1 2"] {
            let err = fx.run(Verb::Status, "u1", raw).await.unwrap_err();
            assert_eq!(
                err.user_message("/zendesk"),
                "Please specify a case number in the form `/zendesk status <case-number>`."
            );
        }
        assert_eq!(fx.service_calls(), 0);
    }

    #[tokio::test]
    async fn test_status_uses_service_account_fallback() {
        let fx = Fixture::new(MockService::default(), true);
        let reply = fx.run(Verb::Status, "u1", "/zendesk status 42").await.unwrap();

        assert_eq!(reply.text_or_empty(), "open");
        assert_eq!(
            *fx.factory.principals.lock().unwrap(),
            vec![Principal::ServiceAccount]
        );
    }

    #[tokio::test]
    async fn test_status_not_connected_without_shared_account() {
        let fx = Fixture::new(MockService::default(), false);
        let err = fx
            .run(Verb::Status, "u1", "/zendesk status 42")
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::NotConnected));
        assert_eq!(fx.service_calls(), 0);
    }

    #[tokio::test]
    async fn test_upstream_error_is_surfaced() {
        let service = MockService {
            fail_with: Some(404),
            ..Default::default()
        };
        let fx = Fixture::new(service, true);
        let err = fx
            .run(Verb::Status, "u1", "/zendesk status 42")
            .await
            .unwrap_err();
        assert_eq!(
            err.user_message("/zendesk"),
            "Zendesk API error (404): RecordNotFound"
        );
    }

    #[tokio::test]
    async fn test_details_attachment() {
        let fx = Fixture::new(MockService::default(), true);
        let reply = fx
            .run(Verb::Details, "u1", "/zendesk details 42")
            .await
            .unwrap();

        assert_eq!(reply.attachments.len(), 1);
        let attachment = &reply.attachments[0];
        assert!(
            attachment
                .text
                .as_deref()
                .unwrap()
                .starts_with("[42: Broken widget](https://acme.zendesk.com/agent/tickets/42)")
        );
        let titles: Vec<&str> = attachment.fields.iter().map(|f| f.title.as_str()).collect();
        assert_eq!(titles, vec!["Status", "Requester", "Organization"]);
        // ticket + organization
        assert_eq!(fx.service_calls(), 2);
    }

    #[tokio::test]
    async fn test_latest_picks_newest_matching() {
        let service = MockService {
            comments: vec![
                comment(1, "first public", true),
                comment(2, "internal note", false),
                comment(3, "second public", true),
            ],
            ..Default::default()
        };
        let fx = Fixture::new(service, true);

        let reply = fx
            .run(Verb::Latest(Visibility::Public), "u1", "/zendesk latest public 5")
            .await
            .unwrap();
        assert_eq!(reply.text_or_empty(), "second public");

        let reply = fx
            .run(Verb::Latest(Visibility::Private), "u1", "/zendesk latest private 5")
            .await
            .unwrap();
        assert_eq!(reply.text_or_empty(), "internal note");
    }

    #[tokio::test]
    async fn test_latest_reports_absence() {
        let service = MockService {
            comments: vec![comment(1, "internal", false)],
            ..Default::default()
        };
        let fx = Fixture::new(service, true);

        let reply = fx
            .run(Verb::Latest(Visibility::Public), "u1", "/zendesk latest public 5")
            .await
            .unwrap();
        assert_eq!(reply.text_or_empty(), "No public comment found on ticket #5.");
    }

    #[tokio::test]
    async fn test_update_requires_user_token() {
        let fx = Fixture::new(MockService::default(), true);
        let err = fx
            .run(
                Verb::Update(Visibility::Private),
                "u1",
                "/zendesk update private 42 hello",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::NotConnected));
        assert_eq!(fx.service_calls(), 0);
    }

    #[tokio::test]
    async fn test_update_preserves_comment_body() {
        let fx = Fixture::new(MockService::default(), false);
        fx.store.put("u1", StoredToken::new("tok")).await;

        let reply = fx
            .run(
                Verb::Update(Visibility::Private),
                "u1",
                "/zendesk   update  private   42   hello   world\n  again  ",
            )
            .await
            .unwrap();
        assert_eq!(
            reply.text_or_empty(),
            "Private comment [hello   world\n  again] was added to ticket #42"
        );

        let updates = fx.factory.service.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, 42);
        assert_eq!(
            updates[0].1,
            TicketUpdate::comment("hello   world\n  again", Visibility::Private)
        );
        assert_eq!(
            *fx.factory.principals.lock().unwrap(),
            vec![Principal::User("u1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_update_public_label() {
        let fx = Fixture::new(MockService::default(), false);
        fx.store.put("u1", StoredToken::new("tok")).await;

        let reply = fx
            .run(Verb::Update(Visibility::Public), "u1", "/zendesk update public 7 thanks!")
            .await
            .unwrap();
        assert_eq!(
            reply.text_or_empty(),
            "Public comment [thanks!] was added to ticket #7"
        );
    }

    #[tokio::test]
    async fn test_update_missing_body() {
        let fx = Fixture::new(MockService::default(), false);
        fx.store.put("u1", StoredToken::new("tok")).await;

        for raw in ["/zendesk update public", "/zendesk update public 7   "] {
            let err = fx
                .run(Verb::Update(Visibility::Public), "u1", raw)
                .await
                .unwrap_err();
            assert!(matches!(err, CommandError::Usage(_)));
        }
        assert_eq!(fx.service_calls(), 0);
    }

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let fx = Fixture::new(MockService::default(), false);

        let reply = fx.run(Verb::Connect, "u1", "/zendesk connect").await.unwrap();
        assert_eq!(
            reply.text_or_empty(),
            "[Click here to link your Zendesk account](https://chat.example.com/plugins/zendesk/user/connect)"
        );

        let reply = fx
            .run(Verb::Connect, "u1", "/zendesk connect now")
            .await
            .unwrap();
        assert!(reply.text_or_empty().contains("Slash Command Help"));

        fx.store.put("u1", StoredToken::new("tok")).await;
        let reply = fx
            .run(Verb::Disconnect, "u1", "/zendesk disconnect")
            .await
            .unwrap();
        assert_eq!(
            reply.text_or_empty(),
            "Your Zendesk account has been disconnected."
        );
        assert!(fx.store.get("u1").await.is_none());

        let reply = fx
            .run(Verb::Disconnect, "u1", "/zendesk disconnect")
            .await
            .unwrap();
        assert_eq!(reply.text_or_empty(), "Your Zendesk account is not connected.");
    }
}
