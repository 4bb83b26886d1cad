//! Function chains whose hops can relay their output to a remote peer.
//!
//! A chain definition such as `upper|lower>host1:7000` names functions from a
//! [`FunctionCatalog`]. Hops written `name>destination` are replaced by a
//! forwarding function that runs the local function and then sends its output,
//! fire-and-forget, to the destination over TCP or a websocket.

pub mod catalog;
pub mod config;
pub mod definition;
pub mod destination;
pub mod forwarding;
mod macros;
pub mod net;
pub mod types;

pub use catalog::{
    Callable, CallError, DispatchError, DynamicFunction, FunctionCatalog, FunctionRegistry,
    ResolvedFunction,
};
pub use config::{ConfigError, FunctionProperties};
pub use definition::{parse_chain, parse_hop, ChainDefinition, DefinitionError, Hop};
pub use destination::{bind, classify, AddressError, Destination, Scheme};
pub use forwarding::{
    BindError, BoundDefinition, ForwardError, Forwarder, ForwardingFunction, HopFailure, Resolution,
};
pub use futures::future::BoxFuture;
pub use net::{
    server::Server, ConnectError, Envelope, NetTransport, DEFAULT_FLUSH_TIMEOUT, SendError, Session, TransportFactory,
    TransportSession,
};
pub use types::{Decode, Encode, Type, TypeMismatch, Typed, Value};

use futures::future::ready;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Signature {
    pub domain: Type,
    pub range: Type,
}

impl Signature {
    pub fn infer<Domain: Typed, Range: Typed>() -> Self {
        Self {
            domain: Domain::rpc_type(),
            range: Range::rpc_type(),
        }
    }
}

pub trait RpcFunction {
    type Domain: Decode;
    type Range: Encode;

    fn name(&self) -> &str;
    fn signature(&self) -> Signature;
    fn call<'call>(&'call self, args: Self::Domain) -> BoxFuture<'call, Self::Range>;
}

/// An [`RpcFunction`] backed by a synchronous closure. See [`from_fn`].
pub struct FnFunction<F, Args, Ret> {
    name: String,
    f: F,
    _types: PhantomData<fn(Args) -> Ret>,
}

/// Wraps a closure as a named [`RpcFunction`] whose signature is inferred from
/// its argument and return types.
pub fn from_fn<F, Args, Ret>(name: impl Into<String>, f: F) -> FnFunction<F, Args, Ret>
where
    F: Fn(Args) -> Ret,
    Args: Decode + Typed,
    Ret: Encode + Typed,
{
    FnFunction {
        name: name.into(),
        f,
        _types: PhantomData,
    }
}

impl<F, Args, Ret> RpcFunction for FnFunction<F, Args, Ret>
where
    F: Fn(Args) -> Ret,
    Args: Decode + Typed,
    Ret: Encode + Typed + Send,
{
    type Domain = Args;
    type Range = Ret;

    fn name(&self) -> &str {
        &self.name
    }

    fn signature(&self) -> Signature {
        Signature::infer::<Args, Ret>()
    }

    fn call<'call>(&'call self, args: Args) -> BoxFuture<'call, Ret> {
        Box::pin(ready((self.f)(args)))
    }
}
