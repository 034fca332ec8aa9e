use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use medarrival_core::{Aggregate, AggregateRoot, ClientId, DomainError};
use medarrival_events::Event;

/// How a client is priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientKind {
    /// Standard customer: always billed at default prices.
    #[serde(rename = "CLIENT_RP")]
    Rp,
    /// Contract (tender) customer: may carry per-client price overrides.
    #[serde(rename = "CLIENT_MARCHER")]
    Marcher,
}

impl ClientKind {
    pub fn toggled(self) -> Self {
        match self {
            ClientKind::Rp => ClientKind::Marcher,
            ClientKind::Marcher => ClientKind::Rp,
        }
    }
}

/// Aggregate root: Client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    id: ClientId,
    name: String,
    address: Option<String>,
    kind: ClientKind,
    version: u64,
    created: bool,
}

impl Client {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ClientId) -> Self {
        Self {
            id,
            name: String::new(),
            address: None,
            kind: ClientKind::Rp,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ClientId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn kind(&self) -> ClientKind {
        self.kind
    }

    pub fn can_have_custom_pricing(&self) -> bool {
        self.kind == ClientKind::Marcher
    }

    /// The scope to hand to the price ledger for this client.
    ///
    /// RP clients read the default scope only, even if overrides were
    /// recorded while they were marcher clients.
    pub fn pricing_scope(&self) -> Option<ClientId> {
        match self.kind {
            ClientKind::Marcher => Some(self.id),
            ClientKind::Rp => None,
        }
    }
}

impl AggregateRoot for Client {
    type Id = ClientId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateClient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateClient {
    pub client_id: ClientId,
    pub name: String,
    pub address: Option<String>,
    pub kind: ClientKind,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateClient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateClient {
    pub client_id: ClientId,
    /// Optional new name (if None, keep existing).
    pub name: Option<String>,
    /// Optional new address (if None, keep existing).
    pub address: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ToggleKind (RP <-> marcher).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleKind {
    pub client_id: ClientId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientCommand {
    CreateClient(CreateClient),
    UpdateClient(UpdateClient),
    ToggleKind(ToggleKind),
}

/// Event: ClientCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCreated {
    pub client_id: ClientId,
    pub name: String,
    pub address: Option<String>,
    pub kind: ClientKind,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ClientUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientUpdated {
    pub client_id: ClientId,
    pub name: String,
    pub address: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ClientKindToggled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientKindToggled {
    pub client_id: ClientId,
    pub kind: ClientKind,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientEvent {
    ClientCreated(ClientCreated),
    ClientUpdated(ClientUpdated),
    ClientKindToggled(ClientKindToggled),
}

impl Event for ClientEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::ClientCreated(_) => "clients.client.created",
            ClientEvent::ClientUpdated(_) => "clients.client.updated",
            ClientEvent::ClientKindToggled(_) => "clients.client.kind_toggled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ClientEvent::ClientCreated(e) => e.occurred_at,
            ClientEvent::ClientUpdated(e) => e.occurred_at,
            ClientEvent::ClientKindToggled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Client {
    type Command = ClientCommand;
    type Event = ClientEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ClientEvent::ClientCreated(e) => {
                self.id = e.client_id;
                self.name = e.name.clone();
                self.address = e.address.clone();
                self.kind = e.kind;
                self.created = true;
            }
            ClientEvent::ClientUpdated(e) => {
                self.name = e.name.clone();
                self.address = e.address.clone();
            }
            ClientEvent::ClientKindToggled(e) => {
                self.kind = e.kind;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ClientCommand::CreateClient(cmd) => self.handle_create(cmd),
            ClientCommand::UpdateClient(cmd) => self.handle_update(cmd),
            ClientCommand::ToggleKind(cmd) => self.handle_toggle(cmd),
        }
    }
}

impl Client {
    fn ensure_client_id(&self, client_id: ClientId) -> Result<(), DomainError> {
        if self.id != client_id {
            return Err(DomainError::invariant("client_id mismatch"));
        }
        Ok(())
    }

    fn ensure_created(&self, client_id: ClientId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_client_id(client_id)
    }

    fn handle_create(&self, cmd: &CreateClient) -> Result<Vec<ClientEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("client already exists"));
        }
        self.ensure_client_id(cmd.client_id)?;

        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        Ok(vec![ClientEvent::ClientCreated(ClientCreated {
            client_id: cmd.client_id,
            name: cmd.name.trim().to_string(),
            address: normalize_address(cmd.address.as_deref()),
            kind: cmd.kind,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateClient) -> Result<Vec<ClientEvent>, DomainError> {
        self.ensure_created(cmd.client_id)?;

        let new_name = cmd
            .name
            .as_deref()
            .map(str::trim)
            .unwrap_or(&self.name)
            .to_string();
        if new_name.is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        let new_address = match cmd.address.as_deref() {
            Some(address) => normalize_address(Some(address)),
            None => self.address.clone(),
        };

        Ok(vec![ClientEvent::ClientUpdated(ClientUpdated {
            client_id: cmd.client_id,
            name: new_name,
            address: new_address,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_toggle(&self, cmd: &ToggleKind) -> Result<Vec<ClientEvent>, DomainError> {
        self.ensure_created(cmd.client_id)?;

        Ok(vec![ClientEvent::ClientKindToggled(ClientKindToggled {
            client_id: cmd.client_id,
            kind: self.kind.toggled(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn normalize_address(address: Option<&str>) -> Option<String> {
    address
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn created_client(kind: ClientKind) -> Client {
        let client_id = ClientId::new();
        let mut client = Client::empty(client_id);
        let cmd = CreateClient {
            client_id,
            name: "Clinique Atlas".to_string(),
            address: Some("12 Rue Ibn Sina, Rabat".to_string()),
            kind,
            occurred_at: test_time(),
        };
        let events = client.handle(&ClientCommand::CreateClient(cmd)).unwrap();
        client.apply(&events[0]);
        client
    }

    #[test]
    fn create_client_emits_client_created_event() {
        let client_id = ClientId::new();
        let client = Client::empty(client_id);
        let cmd = CreateClient {
            client_id,
            name: "  Hopital Central ".to_string(),
            address: Some("   ".to_string()),
            kind: ClientKind::Marcher,
            occurred_at: test_time(),
        };

        let events = client.handle(&ClientCommand::CreateClient(cmd)).unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            ClientEvent::ClientCreated(e) => {
                assert_eq!(e.client_id, client_id);
                assert_eq!(e.name, "Hopital Central");
                assert_eq!(e.address, None);
                assert_eq!(e.kind, ClientKind::Marcher);
            }
            _ => panic!("Expected ClientCreated event"),
        }
    }

    #[test]
    fn create_client_rejects_empty_name() {
        let client_id = ClientId::new();
        let client = Client::empty(client_id);
        let cmd = CreateClient {
            client_id,
            name: "   ".to_string(),
            address: None,
            kind: ClientKind::Rp,
            occurred_at: test_time(),
        };

        let err = client.handle(&ClientCommand::CreateClient(cmd)).unwrap_err();
        match err {
            DomainError::Validation(_) => {}
            _ => panic!("Expected Validation error for empty name"),
        }
    }

    #[test]
    fn create_client_rejects_duplicate_creation() {
        let client = created_client(ClientKind::Rp);
        let cmd = CreateClient {
            client_id: client.id_typed(),
            name: "Again".to_string(),
            address: None,
            kind: ClientKind::Rp,
            occurred_at: test_time(),
        };

        let err = client.handle(&ClientCommand::CreateClient(cmd)).unwrap_err();
        match err {
            DomainError::Conflict(_) => {}
            _ => panic!("Expected Conflict error for duplicate creation"),
        }
    }

    #[test]
    fn update_keeps_fields_that_are_not_provided() {
        let mut client = created_client(ClientKind::Rp);
        let cmd = UpdateClient {
            client_id: client.id_typed(),
            name: Some("Clinique Atlas Sud".to_string()),
            address: None,
            occurred_at: test_time(),
        };

        let events = client.handle(&ClientCommand::UpdateClient(cmd)).unwrap();
        client.apply(&events[0]);

        assert_eq!(client.name(), "Clinique Atlas Sud");
        assert_eq!(client.address(), Some("12 Rue Ibn Sina, Rabat"));
    }

    #[test]
    fn update_rejects_unknown_client() {
        let client_id = ClientId::new();
        let client = Client::empty(client_id);
        let cmd = UpdateClient {
            client_id,
            name: Some("Name".to_string()),
            address: None,
            occurred_at: test_time(),
        };

        let err = client.handle(&ClientCommand::UpdateClient(cmd)).unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn toggle_switches_kind_and_pricing_scope() {
        let mut client = created_client(ClientKind::Rp);
        assert_eq!(client.pricing_scope(), None);
        assert!(!client.can_have_custom_pricing());

        let cmd = ToggleKind {
            client_id: client.id_typed(),
            occurred_at: test_time(),
        };
        let events = client.handle(&ClientCommand::ToggleKind(cmd.clone())).unwrap();
        client.apply(&events[0]);

        assert_eq!(client.kind(), ClientKind::Marcher);
        assert_eq!(client.pricing_scope(), Some(client.id_typed()));
        assert!(client.can_have_custom_pricing());

        let events = client.handle(&ClientCommand::ToggleKind(cmd)).unwrap();
        client.apply(&events[0]);
        assert_eq!(client.kind(), ClientKind::Rp);
        assert_eq!(client.version(), 3);
    }

    #[test]
    fn toggle_rejects_mismatched_client_id() {
        let client = created_client(ClientKind::Marcher);
        let cmd = ToggleKind {
            client_id: ClientId::new(),
            occurred_at: test_time(),
        };

        let err = client.handle(&ClientCommand::ToggleKind(cmd)).unwrap_err();
        match err {
            DomainError::InvariantViolation(_) => {}
            _ => panic!("Expected InvariantViolation for client_id mismatch"),
        }
    }

    #[test]
    fn client_kind_uses_legacy_wire_names() {
        assert_eq!(serde_json::to_string(&ClientKind::Rp).unwrap(), "\"CLIENT_RP\"");
        assert_eq!(
            serde_json::from_str::<ClientKind>("\"CLIENT_MARCHER\"").unwrap(),
            ClientKind::Marcher
        );
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: an even number of toggles restores the original kind.
            #[test]
            fn toggling_twice_is_identity(
                start_marcher in any::<bool>(),
                toggles in 0usize..20,
            ) {
                let kind = if start_marcher { ClientKind::Marcher } else { ClientKind::Rp };
                let mut client = created_client(kind);

                for _ in 0..toggles {
                    let cmd = ToggleKind { client_id: client.id_typed(), occurred_at: Utc::now() };
                    let events = client.handle(&ClientCommand::ToggleKind(cmd)).unwrap();
                    client.apply(&events[0]);
                }

                let expected = if toggles % 2 == 0 { kind } else { kind.toggled() };
                prop_assert_eq!(client.kind(), expected);
                prop_assert_eq!(client.version(), 1 + toggles as u64);
            }

            /// Property: handle never mutates state.
            #[test]
            fn handle_does_not_mutate_state(name in "[A-Za-z][A-Za-z0-9 ]{0,40}") {
                let client = created_client(ClientKind::Rp);
                let before = client.clone();
                let cmd = UpdateClient {
                    client_id: client.id_typed(),
                    name: Some(name),
                    address: None,
                    occurred_at: Utc::now(),
                };
                let _ = client.handle(&ClientCommand::UpdateClient(cmd));
                prop_assert_eq!(before, client);
            }
        }
    }
}
