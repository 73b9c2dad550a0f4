use std::sync::Arc;

use chrono::Utc;
use clinic_auth::TokenVerifier;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::RouterConfig;
use crate::metrics::ServerMetrics;
use crate::nlu::{NluGateway, NluRequest, ask_or_fallback};
use crate::ws::{ADMIN_ID, BotMessage, ClientMessage, EventSender, ParticipantId, ServerMessage};

use super::fanout::{self, Audience, DomainEvent};
use super::gate::{ContentPolicy, GateDecision, KeywordGate};
use super::handoff::{HandoffState, HandoffTable, RequestOutcome};
use super::registry::{ConnectionHandle, ConnectionId, ConnectionRegistry, ParticipantKind};
use super::session::{SessionState, SessionStore, authenticate};

/// Commands processed by the router actor, one at a time
#[derive(Debug)]
pub enum RouterCommand {
    /// A parsed envelope from a connection
    Inbound {
        handle: ConnectionHandle,
        message: ClientMessage,
    },
    /// A connection closed; purge everything it owned
    Disconnected { connection_id: ConnectionId },
    /// An NLU call finished (successfully or with the fallback)
    NluCompleted {
        participant: ParticipantId,
        connection_id: ConnectionId,
        session_id: String,
        messages: Vec<BotMessage>,
        fell_back: bool,
    },
    Stats {
        respond_to: oneshot::Sender<RouterStats>,
    },
    #[cfg(test)]
    Describe {
        participant: ParticipantId,
        respond_to: oneshot::Sender<ParticipantView>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("router actor is gone")]
    Gone,

    #[error("router actor didn't respond")]
    NoResponse,
}

/// Who is online and how many handoffs are open.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterStats {
    pub doctors_online: usize,
    pub admin_online: bool,
    pub patients_online: usize,
    pub guests_online: usize,
    pub handoffs_waiting: usize,
    pub handoffs_active: usize,
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantView {
    pub registered: bool,
    pub kind: Option<ParticipantKind>,
    pub authenticated: bool,
    pub handoff: HandoffState,
}

/// Fixed texts sent on behalf of the bot.
#[derive(Debug, Clone)]
pub struct BotReplies {
    pub fallback: String,
    pub no_agent: String,
    pub handoff_ack: String,
}

/// Everything the actor needs besides its own state.
pub struct RouterServices {
    pub verifier: TokenVerifier,
    pub policy: Box<dyn ContentPolicy>,
    pub nlu: Arc<dyn NluGateway>,
    pub replies: BotReplies,
    pub metrics: Arc<ServerMetrics>,
}

impl RouterServices {
    pub fn from_config(
        config: &RouterConfig,
        nlu: Arc<dyn NluGateway>,
        metrics: Arc<ServerMetrics>,
    ) -> Self {
        let chatbot = &config.chatbot;
        Self {
            verifier: config.auth.verifier(),
            policy: Box::new(KeywordGate::new(
                &chatbot.restricted_keywords,
                chatbot.restricted_message.clone(),
            )),
            nlu,
            replies: BotReplies {
                fallback: chatbot.fallback_message.clone(),
                no_agent: chatbot.no_agent_message.clone(),
                handoff_ack: chatbot.handoff_ack_message.clone(),
            },
            metrics,
        }
    }
}

/// Handle to communicate with the router actor
#[derive(Clone)]
pub struct RouterHandle {
    sender: mpsc::Sender<RouterCommand>,
}

impl RouterHandle {
    /// Start the actor. It stops once every handle is dropped.
    pub fn spawn(services: RouterServices, mailbox_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(mailbox_capacity);
        let actor = RouterActor::new(services, tx.downgrade());
        tokio::spawn(actor.run(rx));
        Self { sender: tx }
    }

    pub async fn inbound(
        &self,
        handle: ConnectionHandle,
        message: ClientMessage,
    ) -> Result<(), RouterError> {
        self.sender
            .send(RouterCommand::Inbound { handle, message })
            .await
            .map_err(|_| RouterError::Gone)
    }

    pub async fn disconnected(&self, connection_id: ConnectionId) -> Result<(), RouterError> {
        self.sender
            .send(RouterCommand::Disconnected { connection_id })
            .await
            .map_err(|_| RouterError::Gone)
    }

    pub async fn stats(&self) -> Result<RouterStats, RouterError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RouterCommand::Stats { respond_to: tx })
            .await
            .map_err(|_| RouterError::Gone)?;
        rx.await.map_err(|_| RouterError::NoResponse)
    }

    #[cfg(test)]
    pub async fn describe(&self, participant: &str) -> Result<ParticipantView, RouterError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RouterCommand::Describe {
                participant: participant.to_string(),
                respond_to: tx,
            })
            .await
            .map_err(|_| RouterError::Gone)?;
        rx.await.map_err(|_| RouterError::NoResponse)
    }
}

/// Single owner of registry, session and handoff state.
///
/// Every command runs to completion before the next one starts, so the maps
/// need no locking. The NLU call is the only asynchronous step: it runs in
/// its own task and reports back through the mailbox.
struct RouterActor {
    registry: ConnectionRegistry,
    sessions: SessionStore,
    handoffs: HandoffTable,
    verifier: TokenVerifier,
    policy: Box<dyn ContentPolicy>,
    nlu: Arc<dyn NluGateway>,
    replies: BotReplies,
    metrics: Arc<ServerMetrics>,
    mailbox: mpsc::WeakSender<RouterCommand>,
}

impl RouterActor {
    fn new(services: RouterServices, mailbox: mpsc::WeakSender<RouterCommand>) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            sessions: SessionStore::new(),
            handoffs: HandoffTable::new(),
            verifier: services.verifier,
            policy: services.policy,
            nlu: services.nlu,
            replies: services.replies,
            metrics: services.metrics,
            mailbox,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<RouterCommand>) {
        debug!("router actor started");
        while let Some(command) = rx.recv().await {
            self.handle(command);
        }
        debug!("router actor stopped");
    }

    fn handle(&mut self, command: RouterCommand) {
        match command {
            RouterCommand::Inbound { handle, message } => self.on_inbound(handle, message),
            RouterCommand::Disconnected { connection_id } => self.on_disconnected(&connection_id),
            RouterCommand::NluCompleted {
                participant,
                connection_id,
                session_id,
                messages,
                fell_back,
            } => {
                self.on_nlu_completed(&participant, &connection_id, session_id, messages, fell_back)
            }
            RouterCommand::Stats { respond_to } => {
                let _ = respond_to.send(self.stats());
            }
            #[cfg(test)]
            RouterCommand::Describe {
                participant,
                respond_to,
            } => {
                let _ = respond_to.send(ParticipantView {
                    registered: self.registry.lookup(&participant).is_some(),
                    kind: self.registry.kind_of(&participant),
                    authenticated: self.sessions.is_authenticated(&participant),
                    handoff: self.handoffs.state(&participant),
                });
            }
        }
    }

    fn stats(&self) -> RouterStats {
        let (handoffs_waiting, handoffs_active) = self.handoffs.counts();
        RouterStats {
            doctors_online: self.registry.count(ParticipantKind::Doctor),
            admin_online: self.registry.is_online(ADMIN_ID),
            patients_online: self.registry.count(ParticipantKind::Patient),
            guests_online: self.registry.count(ParticipantKind::Guest),
            handoffs_waiting,
            handoffs_active,
        }
    }

    // =========================================================================
    // Delivery
    // =========================================================================

    /// Write to a registered participant. Returns whether it was queued.
    fn deliver(&self, id: &str, message: ServerMessage) -> bool {
        match self.registry.send_to(id, message) {
            Ok(()) => {
                self.metrics.message_sent();
                true
            }
            Err(_) => {
                self.metrics.message_dropped();
                false
            }
        }
    }

    /// Answer on the connection that sent the request, registered or not.
    fn reply(&self, handle: &ConnectionHandle, message: ServerMessage) {
        let kind = message.kind();
        match handle.try_send(message) {
            Ok(()) => self.metrics.message_sent(),
            Err(failure) => {
                self.metrics.message_dropped();
                debug!(conn_id = %handle.id(), envelope = kind, ?failure, "reply dropped");
            }
        }
    }

    fn reject(&self, handle: &ConnectionHandle, op: &str, reason: String) {
        warn!(conn_id = %handle.id(), op, %reason, "request rejected");
        self.metrics.message_rejected();
        self.reply(handle, ServerMessage::error(reason));
    }

    /// The connection must own the registry entry of the participant it speaks for.
    fn check_bound(&self, handle: &ConnectionHandle, id: &str, op: &str) -> bool {
        if self.registry.is_bound(handle.id(), id) {
            return true;
        }
        self.reject(
            handle,
            op,
            format!("{op}: this connection is not registered as {id}"),
        );
        false
    }

    fn bot_response(&mut self, id: &str, text: &str) -> ServerMessage {
        ServerMessage::BotResponse {
            messages: vec![BotMessage::text(text)],
            session_id: self.sessions.conversation_id(id),
        }
    }

    // =========================================================================
    // Inbound dispatch
    // =========================================================================

    fn on_inbound(&mut self, handle: ConnectionHandle, message: ClientMessage) {
        debug!(conn_id = %handle.id(), kind = message.kind(), "inbound");
        match message {
            ClientMessage::Init { doctor_id } => self.on_init_staff(handle, doctor_id),
            ClientMessage::InitPatient { patient_id, token } => {
                self.on_init_patient(handle, patient_id, token)
            }
            ClientMessage::InitGuest { guest_id } => self.on_init_guest(handle, guest_id),
            ClientMessage::UpdateLoginStatus { user_id, token } => {
                self.on_update_login_status(&handle, &user_id, token.as_deref())
            }
            ClientMessage::ChatMessage { user_id, message } => {
                self.on_chat_message(&handle, &user_id, message)
            }
            ClientMessage::RequestHumanHandoff { user_id, context } => {
                self.on_request_handoff(&handle, &user_id, context)
            }
            ClientMessage::HumanChatMessage {
                sender,
                user_id,
                text,
                recipient_id,
            } => self.on_human_chat(&handle, sender, user_id, recipient_id, text),
            ClientMessage::EndHumanChat {
                user_id,
                initiated_by,
            } => self.on_end_human_chat(&handle, &user_id, initiated_by),
            event => match DomainEvent::from_client(event) {
                Ok(event) => self.on_domain_event(&handle, event),
                Err(other) => warn!(kind = other.kind(), "message has no handler"),
            },
        }
    }

    // =========================================================================
    // Identity
    // =========================================================================

    /// Bind `id` to `handle`. Returns false when the id belongs to another
    /// kind of participant.
    ///
    /// `continues` tells whether the new owner is provably the same
    /// participant as the connection it replaces. When it is not, whatever
    /// the previous owner had open is ended first.
    fn register(
        &mut self,
        handle: &ConnectionHandle,
        op: &str,
        id: &str,
        kind: ParticipantKind,
        continues: bool,
    ) -> bool {
        match self.registry.register(id, handle.clone(), kind) {
            Err(conflict) => {
                self.reject(handle, op, format!("{op}: {id} {conflict}"));
                false
            }
            Ok(Some(previous)) => {
                previous.close();
                self.metrics.connection_superseded();
                info!(participant = %id, old_conn = %previous.id(), "closed superseded connection");
                if !continues {
                    self.end_conversation(id);
                }
                true
            }
            Ok(None) => true,
        }
    }

    /// Forget the session and any open handoff of `id`; the operator is told
    /// when a handoff was waiting or live.
    fn end_conversation(&mut self, id: &str) {
        self.sessions.remove(id);
        if self.handoffs.remove(id).routes_to_human() {
            self.deliver(
                ADMIN_ID,
                ServerMessage::HandoffEnded {
                    user_id: id.to_string(),
                    initiated_by: id.to_string(),
                },
            );
        }
    }

    fn on_init_staff(&mut self, handle: ConnectionHandle, doctor_id: String) {
        if doctor_id.trim().is_empty() {
            self.reject(&handle, "init", "init: doctorId must not be empty".into());
            return;
        }
        let kind = ParticipantKind::for_staff_id(&doctor_id);
        if !self.register(&handle, "init", &doctor_id, kind, true) {
            return;
        }
        self.sessions.set_session(&doctor_id, SessionState::anonymous());

        if kind == ParticipantKind::Admin {
            let users = self.handoffs.waiting();
            info!(waiting = users.len(), "admin connected");
            self.deliver(ADMIN_ID, ServerMessage::WaitingList { users });
        } else {
            info!(participant = %doctor_id, "doctor connected");
        }
    }

    fn on_init_patient(
        &mut self,
        handle: ConnectionHandle,
        patient_id: String,
        token: Option<String>,
    ) {
        if patient_id.trim().is_empty() || patient_id == ADMIN_ID {
            let reason = format!("init_patient: invalid patientId {patient_id:?}");
            self.reject(&handle, "init_patient", reason);
            return;
        }
        let session = authenticate(&self.verifier, &patient_id, token.as_deref());
        let signed_in_elsewhere = self.sessions.is_authenticated(&patient_id)
            && !self.registry.is_bound(handle.id(), &patient_id);
        if signed_in_elsewhere && !session.authenticated {
            let reason = format!("init_patient: {patient_id} is signed in on another connection");
            self.reject(&handle, "init_patient", reason);
            return;
        }

        // A valid token always names `patient_id`, so two signed-in owners
        // are the same patient.
        let continues = signed_in_elsewhere && session.authenticated;
        let kind = ParticipantKind::Patient;
        if !self.register(&handle, "init_patient", &patient_id, kind, continues) {
            return;
        }
        info!(
            participant = %patient_id,
            authenticated = session.authenticated,
            "patient connected"
        );
        self.sessions.set_session(&patient_id, session);
    }

    fn on_init_guest(&mut self, handle: ConnectionHandle, guest_id: String) {
        if guest_id.trim().is_empty() || guest_id == ADMIN_ID {
            let reason = format!("init_guest: invalid guestId {guest_id:?}");
            self.reject(&handle, "init_guest", reason);
            return;
        }
        if !self.register(&handle, "init_guest", &guest_id, ParticipantKind::Guest, false) {
            return;
        }
        info!(participant = %guest_id, "guest connected");
        self.sessions.set_session(&guest_id, SessionState::anonymous());
    }

    fn on_update_login_status(
        &mut self,
        handle: &ConnectionHandle,
        user_id: &str,
        token: Option<&str>,
    ) {
        if !self.check_bound(handle, user_id, "update_login_status") {
            return;
        }
        if self.registry.kind_of(user_id) == Some(ParticipantKind::Guest) {
            debug!(participant = %user_id, "login status update ignored for guest");
            return;
        }
        let session = authenticate(&self.verifier, user_id, token);
        info!(
            participant = %user_id,
            authenticated = session.authenticated,
            "login status updated"
        );
        self.sessions.set_session(user_id, session);
    }

    // =========================================================================
    // Chat
    // =========================================================================

    fn on_chat_message(&mut self, handle: &ConnectionHandle, user_id: &str, text: String) {
        if !self.check_bound(handle, user_id, "chat_message") {
            return;
        }
        if self.handoffs.routes_to_human(user_id) {
            self.relay_to_admin(user_id, text);
            return;
        }

        let session = self.sessions.get_session(user_id);
        match self.policy.evaluate(&text, session.authenticated) {
            GateDecision::Refuse { keyword } => {
                self.metrics.gate_refused();
                info!(
                    participant = %user_id,
                    %keyword,
                    "restricted request from unauthenticated participant refused"
                );
                let refusal = self.policy.refusal_message().to_string();
                let message = self.bot_response(user_id, &refusal);
                self.deliver(user_id, message);
            }
            GateDecision::Allow => {
                let request = NluRequest {
                    session_id: self.sessions.conversation_id(user_id),
                    message: text,
                    authenticated: session.authenticated,
                    claims: session.claims,
                };
                self.spawn_nlu(user_id, handle.id(), request);
            }
        }
    }

    fn spawn_nlu(&self, participant: &str, connection_id: &str, request: NluRequest) {
        let Some(mailbox) = self.mailbox.upgrade() else {
            return;
        };
        self.metrics.nlu_requested();
        let nlu = Arc::clone(&self.nlu);
        let fallback = self.replies.fallback.clone();
        let participant = participant.to_string();
        let connection_id = connection_id.to_string();
        tokio::spawn(async move {
            let (messages, fell_back) = ask_or_fallback(nlu.as_ref(), &request, &fallback).await;
            let _ = mailbox
                .send(RouterCommand::NluCompleted {
                    participant,
                    connection_id,
                    session_id: request.session_id,
                    messages,
                    fell_back,
                })
                .await;
        });
    }

    fn on_nlu_completed(
        &mut self,
        participant: &str,
        connection_id: &str,
        session_id: String,
        messages: Vec<BotMessage>,
        fell_back: bool,
    ) {
        if fell_back {
            self.metrics.nlu_fell_back();
        }
        if !self.registry.is_bound(connection_id, participant) {
            debug!(
                participant = %participant,
                conn_id = %connection_id,
                "late NLU reply dropped, connection gone"
            );
            self.metrics.message_dropped();
            return;
        }
        if self.handoffs.routes_to_human(participant) {
            debug!(participant = %participant, "NLU reply dropped, conversation handed off");
            self.metrics.message_dropped();
            return;
        }
        self.deliver(
            participant,
            ServerMessage::BotResponse {
                messages,
                session_id,
            },
        );
    }

    /// Participant → operator while a handoff is waiting or live.
    fn relay_to_admin(&mut self, participant: &str, text: String) {
        let message = ServerMessage::HumanChatMessage {
            sender: participant.to_string(),
            user_id: participant.to_string(),
            text,
            timestamp: Utc::now().to_rfc3339(),
        };
        if self.deliver(ADMIN_ID, message) {
            self.mark_exchange(participant);
            return;
        }
        info!(participant = %participant, "operator unreachable, handoff message dropped");
        let no_agent = self.replies.no_agent.clone();
        let notice = self.bot_response(participant, &no_agent);
        self.deliver(participant, notice);
    }

    fn mark_exchange(&mut self, participant: &str) {
        let before = self.handoffs.state(participant);
        match self.handoffs.record_exchange(participant) {
            Ok(HandoffState::Human) if before == HandoffState::Waiting => {
                self.metrics.handoff_started();
                info!(participant = %participant, "handoff is live");
            }
            Ok(_) => {}
            Err(e) => debug!(participant = %participant, error = %e, "exchange outside a handoff"),
        }
    }

    fn on_request_handoff(
        &mut self,
        handle: &ConnectionHandle,
        user_id: &str,
        context: Option<Value>,
    ) {
        const OP: &str = "request_human_handoff";
        if !self.check_bound(handle, user_id, OP) {
            return;
        }
        if user_id == ADMIN_ID {
            self.reject(handle, OP, "the operator cannot request a handoff".into());
            return;
        }
        if let Err(e) = self.handoffs.ensure_can_request(user_id) {
            self.reject(handle, OP, e.to_string());
            return;
        }
        self.metrics.handoff_requested();

        let history = context.unwrap_or_else(|| Value::Array(Vec::new()));
        let admin_reached = self.deliver(
            ADMIN_ID,
            ServerMessage::NewSupportRequest {
                user_id: user_id.to_string(),
                history: history.clone(),
            },
        );

        match self.handoffs.request(user_id, history, admin_reached) {
            Ok(RequestOutcome::Queued) => {
                info!(participant = %user_id, "handoff requested, waiting for operator");
                let message = ServerMessage::HandoffInitiated {
                    message: self.replies.handoff_ack.clone(),
                };
                self.deliver(user_id, message);
            }
            Ok(RequestOutcome::NoAgent) => {
                self.metrics.handoff_unavailable();
                info!(participant = %user_id, "handoff requested but no operator online");
                let no_agent = self.replies.no_agent.clone();
                let message = self.bot_response(user_id, &no_agent);
                self.deliver(user_id, message);
            }
            Err(e) => self.reject(handle, OP, e.to_string()),
        }
    }

    fn on_human_chat(
        &mut self,
        handle: &ConnectionHandle,
        sender: String,
        user_id: Option<String>,
        recipient_id: Option<String>,
        text: String,
    ) {
        const OP: &str = "human_chat_message";
        if sender == ADMIN_ID {
            if !self.check_bound(handle, ADMIN_ID, OP) {
                return;
            }
            let Some(target) = recipient_id.or(user_id) else {
                self.reject(handle, OP, format!("{OP}: recipientId is required"));
                return;
            };
            if self.handoffs.state(&target) == HandoffState::Bot {
                let reason = format!("{target} has not requested a human operator");
                self.reject(handle, OP, reason);
                return;
            }
            let message = ServerMessage::HumanChatMessage {
                sender: ADMIN_ID.to_string(),
                user_id: target.clone(),
                text,
                timestamp: Utc::now().to_rfc3339(),
            };
            if self.deliver(&target, message) {
                self.mark_exchange(&target);
            } else {
                self.reply(handle, ServerMessage::error(format!("{target} is not connected")));
            }
            return;
        }

        let participant = user_id.unwrap_or(sender);
        if !self.check_bound(handle, &participant, OP) {
            return;
        }
        if !self.handoffs.routes_to_human(&participant) {
            self.reject(handle, OP, "no handoff in progress".into());
            return;
        }
        self.relay_to_admin(&participant, text);
    }

    fn on_end_human_chat(
        &mut self,
        handle: &ConnectionHandle,
        user_id: &str,
        initiated_by: String,
    ) {
        let by_admin = initiated_by == ADMIN_ID;
        let speaker = if by_admin { ADMIN_ID } else { user_id };
        if !self.check_bound(handle, speaker, "end_human_chat") {
            return;
        }
        if let Err(e) = self.handoffs.end(user_id) {
            self.reject(handle, "end_human_chat", e.to_string());
            return;
        }
        self.metrics.handoff_ended();
        info!(participant = %user_id, by_admin, "handoff ended");

        let counterpart = if by_admin { user_id } else { ADMIN_ID };
        self.deliver(
            counterpart,
            ServerMessage::HandoffEnded {
                user_id: user_id.to_string(),
                initiated_by,
            },
        );
    }

    // =========================================================================
    // Domain events
    // =========================================================================

    fn on_domain_event(&mut self, handle: &ConnectionHandle, event: DomainEvent) {
        let kind = event.kind.as_str();
        let conn = handle.id();
        let allowed = match event.sender {
            None => self.registry.has_connection(conn),
            Some(EventSender::Admin) => self.registry.is_bound(conn, ADMIN_ID),
            Some(EventSender::Doctor) => {
                self.registry.connection_has_kind(conn, ParticipantKind::Doctor)
            }
        };
        if !allowed {
            let reason = match event.sender {
                None => format!("{kind}: connection must announce itself first"),
                Some(sender) => format!("{kind}: this connection cannot send as {sender:?}"),
            };
            self.reject(handle, kind, reason);
            return;
        }
        let Some(plan) = fanout::plan(&event) else {
            warn!(event = kind, sender = ?event.sender, "no routing rule for event, dropped");
            return;
        };

        let doctors = self.registry.online(ParticipantKind::Doctor);
        let mut delivered = 0;
        for (id, audience) in fanout::resolve(&plan.audiences, &doctors) {
            let expected = match audience {
                Audience::Doctor(_) | Audience::AllDoctors => ParticipantKind::Doctor,
                Audience::Patient(_) => ParticipantKind::Patient,
                Audience::Admin => ParticipantKind::Admin,
                Audience::AllStaff => ParticipantKind::for_staff_id(&id),
            };
            if self.registry.kind_of(&id) != Some(expected) {
                debug!(event = kind, recipient = %id, "recipient offline, event dropped");
                self.metrics.message_dropped();
                continue;
            }
            if self.deliver(&id, plan.message.clone()) {
                delivered += 1;
            }
        }
        self.metrics.event_routed(delivered);
        debug!(event = kind, delivered, "event fanned out");
    }

    // =========================================================================
    // Disconnect
    // =========================================================================

    fn on_disconnected(&mut self, connection_id: &str) {
        for (id, kind) in self.registry.unregister(connection_id) {
            info!(participant = %id, ?kind, "participant disconnected");
            self.end_conversation(&id);
            if kind == ParticipantKind::Admin {
                self.release_handoffs();
            }
        }
    }

    /// The operator left: every waiting or live handoff goes back to the bot
    /// and its participant is told.
    fn release_handoffs(&mut self) {
        let released = self.handoffs.release_all();
        if !released.is_empty() {
            info!(count = released.len(), "operator left, handoffs returned to the bot");
        }
        for id in released {
            self.deliver(
                &id,
                ServerMessage::HandoffEnded {
                    user_id: id.clone(),
                    initiated_by: ADMIN_ID.to_string(),
                },
            );
        }
    }
}
