pub mod driver;
pub mod engine;
pub mod frontier;
pub mod interceptor;
pub mod links;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod pool;
pub mod quiescence;
pub mod scope;
pub mod sink;

pub use driver::{BrowserDriver, ResponseLoader, TabHandle};
pub use engine::CrawlSession;
pub use frontier::Frontier;
pub use interceptor::{InterceptAction, Interceptor, Verdict};
pub use models::{CapturedExchange, InterceptedRequest, LoadedResponse, ResourceKind, SourceKind, UrlInfo};
pub use pool::{TabOutcome, TabPool};
pub use quiescence::{CrawlState, DrainStage, QuiescenceDetector};
pub use sink::ResultSink;
