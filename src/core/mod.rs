pub mod context;
pub mod dispatcher;
pub mod error;
pub mod fetcher;
pub mod fragment;
pub mod gateway;
pub mod registry;
pub mod resolver;
pub mod route;

pub use context::RequestContext;
pub use dispatcher::{Dispatch, RouteDispatcher};
pub use error::{FetchFailure, FragmentFetchError, FragmentOrigin};
pub use fetcher::{FetchOptions, FetchResult, FragmentFetcher};
pub use fragment::{BodyType, Fragment, FragmentBody, FragmentContent, RemoteUrl};
pub use gateway::{ProxyError, ProxyFallbackGateway};
pub use registry::{RegistryError, RouteRegistry};
pub use resolver::{Params, Resolvable};
pub use route::{Route, RouteBuilder};
