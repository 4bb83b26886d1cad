//! Registration of forwarding functions for `name>destination` hops.

use crate::{
    catalog::{
        default_content_type, Callable, CallError, DispatchError, DynamicFunction,
        FunctionCatalog, FunctionRegistry, ResolvedFunction,
    },
    config::FunctionProperties,
    definition::{parse_hop, split_chain, DefinitionError, Hop},
    destination::{bind, classify, AddressError, Destination},
    net::{ConnectError, Envelope, Session, TransportFactory},
    types::Value,
    Signature,
};
use futures::future::{join_all, BoxFuture};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tracing::{debug, warn};

/// Runs a local function and relays its output to a peer without waiting for
/// delivery. The caller always receives the local output.
pub struct ForwardingFunction {
    name: String,
    local: Callable,
    session: Session,
}

impl ForwardingFunction {
    pub fn new(name: impl Into<String>, local: Callable, session: Session) -> Self {
        Self {
            name: name.into(),
            local,
            session,
        }
    }
}

impl DynamicFunction for ForwardingFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn signature(&self) -> &Signature {
        self.local.signature()
    }

    fn call(&self, args: Value) -> BoxFuture<'_, Result<Value, CallError>> {
        Box::pin(async move {
            let output = self.local.call(args).await?;
            let envelope = Envelope {
                origin: self.name.clone(),
                payload: output.clone(),
            };
            if let Err(error) = self.session.send(envelope) {
                warn!(
                    function = %self.name,
                    destination = self.session.destination(),
                    %error,
                    "output not forwarded"
                );
            }
            Ok(output)
        })
    }
}

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error(transparent)]
    Configuration(#[from] DefinitionError),

    #[error(transparent)]
    InvalidAddress(#[from] AddressError),

    #[error("no local function named '{0}'")]
    LocalLookup(String),

    #[error(transparent)]
    Connection(#[from] ConnectError),
}

#[derive(Debug)]
pub struct HopFailure {
    pub hop: String,
    pub error: ForwardError,
}

/// Outcome of resolving one chain definition.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Names that now resolve to a forwarding function.
    pub forwarded: Vec<String>,
    /// Local hops that were already registered.
    pub local: Vec<String>,
    pub failures: Vec<HopFailure>,
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum BindError {
    /// The definition itself is malformed, e.g. a hop with two redirects.
    #[error(transparent)]
    Configuration(DefinitionError),

    #[error("{error}")]
    Unresolved {
        #[source]
        error: DispatchError,
        resolution: Resolution,
    },
}

/// A definition bound by [`Forwarder::register_for_destination`].
pub struct BoundDefinition {
    pub function: ResolvedFunction,
    pub resolution: Resolution,
}

/// Turns `name>destination` hops into forwarding functions.
///
/// Owns the transport factory and every session it opened. Hops sharing a
/// destination share its session.
pub struct Forwarder<T> {
    transport: T,
    sessions: HashMap<Destination, Session>,
}

impl<T> Forwarder<T>
where
    T: TransportFactory,
{
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            sessions: HashMap::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn sessions(&self) -> impl Iterator<Item = (&Destination, &Session)> + '_ {
        self.sessions.iter()
    }

    /// Registers a forwarding function for every remote hop of `definition`,
    /// under the hop's local name. A hop that fails is recorded in the
    /// returned [`Resolution`] and the remaining hops are still processed.
    ///
    /// Not idempotent: resolving the same remote hop twice wraps the first
    /// forwarder in a second one.
    pub async fn resolve_and_register<R>(
        &mut self,
        definition: &str,
        registry: &mut R,
    ) -> Resolution
    where
        R: FunctionRegistry + ?Sized,
    {
        let mut resolution = Resolution::default();
        let tokens = split_chain(definition);
        if tokens.is_empty() {
            let error = DefinitionError::EmptyChain(definition.to_owned());
            warn!(definition, %error, "nothing to resolve");
            resolution.failures.push(HopFailure {
                hop: definition.to_owned(),
                error: error.into(),
            });
            return resolution;
        }

        for token in tokens {
            match self.resolve_hop(token, registry).await {
                Ok(Some(name)) => resolution.forwarded.push(name),
                Ok(None) => resolution.local.push(token.to_owned()),
                Err(error) => {
                    warn!(hop = token, %error, "hop not registered");
                    resolution.failures.push(HopFailure {
                        hop: token.to_owned(),
                        error,
                    });
                }
            }
        }
        resolution
    }

    async fn resolve_hop<R>(
        &mut self,
        token: &str,
        registry: &mut R,
    ) -> Result<Option<String>, ForwardError>
    where
        R: FunctionRegistry + ?Sized,
    {
        let (local_name, destination) = match parse_hop(token)? {
            Hop::Local(name) => {
                return match registry.lookup(&name) {
                    Some(_) => Ok(None),
                    None => Err(ForwardError::LocalLookup(name)),
                };
            }
            Hop::Remote {
                local_name,
                destination,
            } => (local_name, destination),
        };

        debug!(function = %local_name, %destination, "registering forwarder");
        let local = registry
            .lookup(&local_name)
            .ok_or_else(|| ForwardError::LocalLookup(local_name.clone()))?;
        let destination = classify(&destination)?;
        let session = self.session_for(&destination).await?;
        let forwarder = ForwardingFunction::new(local_name.clone(), local, session);
        registry.register(&local_name, Arc::new(forwarder));
        Ok(Some(local_name))
    }

    async fn session_for(&mut self, destination: &Destination) -> Result<Session, ConnectError> {
        if let Some(session) = self.sessions.get(destination) {
            return Ok(session.clone());
        }
        let session = bind(destination, &self.transport).await?;
        self.sessions.insert(destination.clone(), session.clone());
        Ok(session)
    }

    /// Registers the forwarders `definition` needs, then looks it up with the
    /// configured content type, or one derived from its output type.
    ///
    /// A malformed definition fails with [`BindError::Configuration`]. Other hop
    /// failures do not fail the lookup: a failed remote hop leaves its local
    /// function in place. Check [`BoundDefinition::resolution`].
    pub async fn register_for_destination(
        &mut self,
        definition: &str,
        catalog: &mut FunctionCatalog,
        properties: &FunctionProperties,
    ) -> Result<BoundDefinition, BindError> {
        let mut resolution = self.resolve_and_register(definition, catalog).await;
        let malformed = resolution
            .failures
            .iter()
            .position(|failure| matches!(failure.error, ForwardError::Configuration(_)));
        if let Some(index) = malformed {
            if let ForwardError::Configuration(error) = resolution.failures.remove(index).error {
                return Err(BindError::Configuration(error));
            }
        }

        let Some(composed) = catalog.lookup_definition(definition) else {
            return Err(BindError::Unresolved {
                error: DispatchError::NoSuchFunction(definition.to_owned()),
                resolution,
            });
        };
        let accept = properties
            .accept()
            .unwrap_or_else(|| default_content_type(&composed.signature().range));
        let function = ResolvedFunction::new(composed, accept);
        debug!(definition, content_type = function.content_type(), "function bound");
        Ok(BoundDefinition {
            function,
            resolution,
        })
    }

    /// Closes every session opened so far, flushing queued payloads within each
    /// session's flush timeout.
    pub async fn shutdown(&mut self) {
        let closing = self.sessions.drain().map(|(destination, session)| async move {
            debug!(%destination, "closing forwarding session");
            session.close().await;
        });
        join_all(closing).await;
    }
}
