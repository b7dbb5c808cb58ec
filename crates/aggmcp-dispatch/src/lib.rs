mod adder;
mod dispatcher;
mod launch;
mod routes;
mod types;

pub use adder::{AddOutcome, Adder, ArgumentRequirementView, AuthRequirementView};
pub use dispatcher::{DispatchError, Dispatcher};
pub use launch::build_launch_spec;
pub use routes::{RouteMaps, RouteTable};
pub use types::{
    builtin_tools, AggregatedPrompt, AggregatedResource, AggregatedResourceTemplate, AggregatedTool,
    ADD_NEW_MCP_TOOL, SEARCH_MCPS_TOOL,
};
