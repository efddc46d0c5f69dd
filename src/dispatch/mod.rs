//! Task orchestration and peer dispatch.
//!
//! Leaf-first:
//!
//! - [`directory`] — TTL cache of the peer catalog, resolved from the registry
//! - [`matcher`] — picks the peers a request should go to
//! - [`task`] — step sequencer and task state
//! - [`invoker`] — one bounded, failure-isolated call to one peer
//! - [`progress`] — ordered progress events towards the caller
//! - [`orchestrator`] — wires the above into plan + execute

pub mod catalog;
pub mod directory;
pub mod invoker;
pub mod matcher;
pub mod orchestrator;
pub mod progress;
pub mod task;

pub use catalog::{PeerCatalog, PeerDescriptor};
pub use directory::{DirectorySource, DiscoveryObserver, HttpDirectorySource, PeerDirectoryCache};
pub use invoker::{A2aTransport, InvokeOutcome, PeerInvoker, PeerTransport};
pub use matcher::{
    ChatCompletionsCollaborator, KeywordMatcher, KeywordRule, MatchingCollaborator, PeerMatcher,
    SemanticMatcher,
};
pub use orchestrator::Orchestrator;
pub use progress::{ChannelSink, MemorySink, ProgressEmitter, ProgressEvent, ProgressSink};
pub use task::{DispatchStep, DispatchTask, StepPayload, StepState, TaskState};
