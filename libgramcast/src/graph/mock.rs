//! Mock graph implementation for testing
//!
//! [`MockGraph`] records every call it receives and answers from a script, so
//! the publish protocol and the token lifecycle can be exercised without
//! credentials or network access. Ids are generated sequentially for
//! containers (`container-1`, `container-2`, ...) which makes ordering
//! assertions straightforward.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use super::{
    AppCredentials, ContainerRequest, ContainerStatus, CreationId, ExchangedToken, GraphApi,
    MediaId, TokenIntrospection,
};
use crate::error::{PlatformError, Result};

/// A call received by the mock, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum GraphCall {
    CreateContainer(ContainerRequest),
    Publish(CreationId),
    ContainerStatus(CreationId),
    /// Holds the token that was inspected
    IntrospectToken(String),
    /// Holds the token that was exchanged
    ExchangeToken(String),
}

#[derive(Debug)]
struct MockState {
    calls: Vec<GraphCall>,
    containers_created: usize,
    /// Remaining publish calls that answer "not ready"
    publish_not_ready: u32,
    publish_error: Option<PlatformError>,
    /// Fail the n-th (1-based) container creation
    create_error: Option<(usize, PlatformError)>,
    /// Scripted statuses; the last one repeats once the script runs out
    statuses: VecDeque<ContainerStatus>,
    introspection: std::result::Result<TokenIntrospection, PlatformError>,
    exchange: std::result::Result<(String, Option<u64>), PlatformError>,
}

/// Scriptable stand-in for the graph API
#[derive(Debug)]
pub struct MockGraph {
    state: Mutex<MockState>,
}

impl Default for MockGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGraph {
    /// A mock where everything succeeds immediately and the token is valid
    /// and never expires
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                calls: Vec::new(),
                containers_created: 0,
                publish_not_ready: 0,
                publish_error: None,
                create_error: None,
                statuses: VecDeque::new(),
                introspection: Ok(TokenIntrospection {
                    is_valid: true,
                    expires_at: Some(0),
                    ..Default::default()
                }),
                exchange: Ok(("EAAmock-refreshed".to_string(), Some(60 * 86_400))),
            }),
        }
    }

    /// `publish` reports "media not ready" `times` times before succeeding
    pub fn with_publish_not_ready(self, times: u32) -> Self {
        self.lock().publish_not_ready = times;
        self
    }

    /// `publish` always fails with `error`
    pub fn with_publish_error(self, error: PlatformError) -> Self {
        self.lock().publish_error = Some(error);
        self
    }

    /// The `nth` container creation (1-based) fails with `error`
    pub fn with_create_error(self, nth: usize, error: PlatformError) -> Self {
        self.lock().create_error = Some((nth, error));
        self
    }

    /// Answer status polls with `statuses` in order, repeating the last one
    pub fn with_statuses(self, statuses: Vec<ContainerStatus>) -> Self {
        self.lock().statuses = statuses.into();
        self
    }

    pub fn with_introspection(self, introspection: TokenIntrospection) -> Self {
        self.lock().introspection = Ok(introspection);
        self
    }

    pub fn with_introspection_error(self, error: PlatformError) -> Self {
        self.lock().introspection = Err(error);
        self
    }

    pub fn with_exchange(self, token: &str, expires_in: Option<u64>) -> Self {
        self.lock().exchange = Ok((token.to_string(), expires_in));
        self
    }

    pub fn with_exchange_error(self, error: PlatformError) -> Self {
        self.lock().exchange = Err(error);
        self
    }

    /// Every call received so far
    pub fn calls(&self) -> Vec<GraphCall> {
        self.lock().calls.clone()
    }

    /// Container creation requests, in order
    pub fn container_requests(&self) -> Vec<ContainerRequest> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                GraphCall::CreateContainer(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    /// Container creations that assembled a carousel
    pub fn composite_requests(&self) -> Vec<ContainerRequest> {
        self.container_requests()
            .into_iter()
            .filter(|request| request.children.is_some())
            .collect()
    }

    pub fn publish_calls(&self) -> usize {
        self.count(|call| matches!(call, GraphCall::Publish(_)))
    }

    pub fn status_calls(&self) -> usize {
        self.count(|call| matches!(call, GraphCall::ContainerStatus(_)))
    }

    pub fn exchange_calls(&self) -> usize {
        self.count(|call| matches!(call, GraphCall::ExchangeToken(_)))
    }

    fn count(&self, predicate: impl Fn(&GraphCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| predicate(call)).count()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test must not poison the mock for the assertions after it
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl GraphApi for MockGraph {
    async fn create_container(&self, request: &ContainerRequest) -> Result<CreationId> {
        let mut state = self.lock();
        state.calls.push(GraphCall::CreateContainer(request.clone()));
        state.containers_created += 1;

        if let Some((nth, error)) = &state.create_error {
            if *nth == state.containers_created {
                return Err(error.clone().into());
            }
        }

        Ok(CreationId(format!("container-{}", state.containers_created)))
    }

    async fn publish(&self, creation_id: &CreationId) -> Result<MediaId> {
        let mut state = self.lock();
        state.calls.push(GraphCall::Publish(creation_id.clone()));

        if let Some(error) = &state.publish_error {
            return Err(error.clone().into());
        }

        if state.publish_not_ready > 0 {
            state.publish_not_ready -= 1;
            return Err(PlatformError::Processing(
                "The media is not ready for publishing, please wait for a moment".to_string(),
            )
            .into());
        }

        Ok(MediaId(format!("media-{}", uuid::Uuid::new_v4())))
    }

    async fn container_status(&self, creation_id: &CreationId) -> Result<ContainerStatus> {
        let mut state = self.lock();
        state.calls.push(GraphCall::ContainerStatus(creation_id.clone()));

        let status = if state.statuses.len() > 1 {
            state.statuses.pop_front()
        } else {
            state.statuses.front().cloned()
        };

        Ok(status.unwrap_or(ContainerStatus::Finished))
    }

    async fn introspect_token(
        &self,
        _app: &AppCredentials,
        token: &SecretString,
    ) -> Result<TokenIntrospection> {
        let mut state = self.lock();
        state
            .calls
            .push(GraphCall::IntrospectToken(token.expose_secret().to_string()));

        state.introspection.clone().map_err(Into::into)
    }

    async fn exchange_token(&self, _app: &AppCredentials, token: &SecretString) -> Result<ExchangedToken> {
        let mut state = self.lock();
        state
            .calls
            .push(GraphCall::ExchangeToken(token.expose_secret().to_string()));

        match &state.exchange {
            Ok((new_token, expires_in)) => Ok(ExchangedToken {
                access_token: SecretString::from(new_token.clone()),
                expires_in: *expires_in,
            }),
            Err(error) => Err(error.clone().into()),
        }
    }
}
