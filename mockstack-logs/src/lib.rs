//! CloudWatch Logs implementation for MockStack
//!
//! Log groups and streams are held in memory per account and region.
//! Lambda writes function output here through [`LogsStorage::append`].

pub mod handlers;
mod storage;

pub use handlers::{handle_request, TARGET_PREFIX};
pub use storage::{
    DescribeStreamsQuery, EventsPage, GetEventsQuery, InputLogEvent, LogEvent, LogGroupInfo,
    LogStreamInfo, LogsError, LogsState, LogsStorage, StreamOrder,
};
