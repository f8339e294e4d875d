//! CloudWatch Logs in-memory storage

use chrono::Utc;
use dashmap::DashMap;
use mockstack_core::{AccountRegionKey, StateStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Default page size for GetLogEvents
const DEFAULT_EVENT_LIMIT: usize = 10_000;

/// Default page size for the Describe* operations
const DEFAULT_DESCRIBE_LIMIT: usize = 50;

/// Log groups of one account/region
#[derive(Default)]
pub struct RegionLogs {
    log_groups: DashMap<String, LogGroup>,
}

/// A log group containing multiple streams
pub struct LogGroup {
    pub log_group_name: String,
    pub creation_time: i64,
    pub streams: DashMap<String, LogStream>,
}

impl LogGroup {
    fn new(name: &str, creation_time: i64) -> Self {
        Self {
            log_group_name: name.to_string(),
            creation_time,
            streams: DashMap::new(),
        }
    }
}

/// A log stream containing events
pub struct LogStream {
    pub log_stream_name: String,
    pub creation_time: i64,
    pub first_event_timestamp: Option<i64>,
    pub last_event_timestamp: Option<i64>,
    pub last_ingestion_time: Option<i64>,
    pub events: Vec<LogEvent>,
}

impl LogStream {
    fn new(name: &str, creation_time: i64) -> Self {
        Self {
            log_stream_name: name.to_string(),
            creation_time,
            first_event_timestamp: None,
            last_event_timestamp: None,
            last_ingestion_time: None,
            events: Vec::new(),
        }
    }

    fn push(&mut self, timestamp: i64, message: String, ingestion_time: i64) {
        self.first_event_timestamp = Some(
            self.first_event_timestamp
                .map_or(timestamp, |first| first.min(timestamp)),
        );
        self.last_event_timestamp = Some(
            self.last_event_timestamp
                .map_or(timestamp, |last| last.max(timestamp)),
        );
        self.last_ingestion_time = Some(ingestion_time);
        self.events.push(LogEvent {
            timestamp,
            message,
            ingestion_time,
        });
    }

    fn stored_bytes(&self) -> i64 {
        self.events.iter().map(|e| e.message.len() as i64).sum()
    }
}

/// A single log event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub timestamp: i64,
    pub message: String,
    pub ingestion_time: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogGroupInfo {
    pub log_group_name: String,
    pub creation_time: i64,
    pub stored_bytes: i64,
    pub arn: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogStreamInfo {
    pub log_stream_name: String,
    pub creation_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_event_timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event_timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_ingestion_time: Option<i64>,
    pub stored_bytes: i64,
    pub arn: String,
}

/// Ordering for DescribeLogStreams
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamOrder {
    #[default]
    LogStreamName,
    LastEventTime,
}

#[derive(Debug, Clone, Default)]
pub struct DescribeStreamsQuery {
    pub log_stream_name_prefix: Option<String>,
    pub order_by: StreamOrder,
    pub descending: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct GetEventsQuery {
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub start_from_head: bool,
    pub limit: Option<usize>,
    pub next_token: Option<String>,
}

/// One page of GetLogEvents
#[derive(Debug, Clone)]
pub struct EventsPage {
    pub events: Vec<LogEvent>,
    pub next_forward_token: String,
    pub next_backward_token: String,
}

/// An event submitted through PutLogEvents
#[derive(Debug, Clone)]
pub struct InputLogEvent {
    pub timestamp: i64,
    pub message: String,
}

/// CloudWatch Logs errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LogsError {
    #[error("The specified log group does not exist: {0}")]
    GroupNotFound(String),

    #[error("The specified log stream does not exist: {0}")]
    StreamNotFound(String),

    #[error("The specified log group already exists: {0}")]
    GroupAlreadyExists(String),

    #[error("The specified log stream already exists: {0}")]
    StreamAlreadyExists(String),

    #[error("{0}")]
    InvalidParameter(String),
}

/// In-memory CloudWatch Logs storage, scoped by account and region
#[derive(Default)]
pub struct LogsStorage {
    regions: StateStore<RegionLogs>,
}

impl LogsStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_log_group(&self, scope: &AccountRegionKey, name: &str) -> Result<(), LogsError> {
        validate_name("logGroupName", name)?;
        let region = self.regions.get_or_create(scope);

        let created = match region.log_groups.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(LogsError::GroupAlreadyExists(name.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(LogGroup::new(name, now_millis()));
                debug!(scope = %scope, log_group = %name, "Created log group");
                Ok(())
            }
        };
        created
    }

    pub fn delete_log_group(&self, scope: &AccountRegionKey, name: &str) -> Result<(), LogsError> {
        self.regions
            .get(scope)
            .and_then(|region| region.log_groups.remove(name))
            .map(|_| ())
            .ok_or_else(|| LogsError::GroupNotFound(name.to_string()))
    }

    /// Log groups sorted by name
    pub fn describe_log_groups(
        &self,
        scope: &AccountRegionKey,
        prefix: Option<&str>,
        limit: Option<usize>,
    ) -> Vec<LogGroupInfo> {
        let Some(region) = self.regions.get(scope) else {
            return Vec::new();
        };

        let mut groups: Vec<LogGroupInfo> = region
            .log_groups
            .iter()
            .filter(|g| prefix.map_or(true, |p| g.log_group_name.starts_with(p)))
            .map(|g| LogGroupInfo {
                log_group_name: g.log_group_name.clone(),
                creation_time: g.creation_time,
                stored_bytes: g.streams.iter().map(|s| s.stored_bytes()).sum(),
                arn: scope.arn("logs", &format!("log-group:{}:*", g.log_group_name)),
            })
            .collect();

        groups.sort_by(|a, b| a.log_group_name.cmp(&b.log_group_name));
        groups.truncate(limit.unwrap_or(DEFAULT_DESCRIBE_LIMIT));
        groups
    }

    pub fn create_log_stream(
        &self,
        scope: &AccountRegionKey,
        group_name: &str,
        stream_name: &str,
    ) -> Result<(), LogsError> {
        validate_name("logStreamName", stream_name)?;
        let region = self
            .regions
            .get(scope)
            .ok_or_else(|| LogsError::GroupNotFound(group_name.to_string()))?;
        let group = region
            .log_groups
            .get(group_name)
            .ok_or_else(|| LogsError::GroupNotFound(group_name.to_string()))?;

        let created = match group.streams.entry(stream_name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(LogsError::StreamAlreadyExists(stream_name.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(LogStream::new(stream_name, now_millis()));
                Ok(())
            }
        };
        created
    }

    pub fn describe_log_streams(
        &self,
        scope: &AccountRegionKey,
        group_name: &str,
        query: &DescribeStreamsQuery,
    ) -> Result<Vec<LogStreamInfo>, LogsError> {
        let region = self
            .regions
            .get(scope)
            .ok_or_else(|| LogsError::GroupNotFound(group_name.to_string()))?;
        let group = region
            .log_groups
            .get(group_name)
            .ok_or_else(|| LogsError::GroupNotFound(group_name.to_string()))?;

        if query.order_by == StreamOrder::LastEventTime && query.log_stream_name_prefix.is_some() {
            return Err(LogsError::InvalidParameter(
                "Cannot order by LastEventTime with a logStreamNamePrefix.".to_string(),
            ));
        }

        let mut streams: Vec<LogStreamInfo> = group
            .streams
            .iter()
            .filter(|s| {
                query
                    .log_stream_name_prefix
                    .as_ref()
                    .map_or(true, |prefix| s.log_stream_name.starts_with(prefix))
            })
            .map(|s| LogStreamInfo {
                log_stream_name: s.log_stream_name.clone(),
                creation_time: s.creation_time,
                first_event_timestamp: s.first_event_timestamp,
                last_event_timestamp: s.last_event_timestamp,
                last_ingestion_time: s.last_ingestion_time,
                stored_bytes: s.stored_bytes(),
                arn: scope.arn(
                    "logs",
                    &format!("log-group:{}:log-stream:{}", group_name, s.log_stream_name),
                ),
            })
            .collect();

        match query.order_by {
            StreamOrder::LastEventTime => {
                streams.sort_by_key(|s| (s.last_event_timestamp.unwrap_or(0), s.creation_time));
            }
            StreamOrder::LogStreamName => {
                streams.sort_by(|a, b| a.log_stream_name.cmp(&b.log_stream_name));
            }
        }

        if query.descending {
            streams.reverse();
        }

        streams.truncate(query.limit.unwrap_or(DEFAULT_DESCRIBE_LIMIT));
        Ok(streams)
    }

    /// Append events to an existing stream, returning the next sequence token
    pub fn put_log_events(
        &self,
        scope: &AccountRegionKey,
        group_name: &str,
        stream_name: &str,
        events: Vec<InputLogEvent>,
    ) -> Result<String, LogsError> {
        if events.is_empty() {
            return Err(LogsError::InvalidParameter(
                "logEvents must contain at least one event".to_string(),
            ));
        }

        let region = self
            .regions
            .get(scope)
            .ok_or_else(|| LogsError::GroupNotFound(group_name.to_string()))?;
        let group = region
            .log_groups
            .get(group_name)
            .ok_or_else(|| LogsError::GroupNotFound(group_name.to_string()))?;
        let mut stream = group
            .streams
            .get_mut(stream_name)
            .ok_or_else(|| LogsError::StreamNotFound(stream_name.to_string()))?;

        let ingestion_time = now_millis();
        for event in events {
            stream.push(event.timestamp, event.message, ingestion_time);
        }

        Ok(format!("{:056}", stream.events.len()))
    }

    /// Append messages stamped with the current time, creating the group
    /// and stream if needed
    ///
    /// This is how Lambda delivers function output.
    pub fn append(
        &self,
        scope: &AccountRegionKey,
        group_name: &str,
        stream_name: &str,
        messages: impl IntoIterator<Item = String>,
    ) {
        let timestamp = now_millis();
        let region = self.regions.get_or_create(scope);

        let group = region
            .log_groups
            .entry(group_name.to_string())
            .or_insert_with(|| LogGroup::new(group_name, timestamp));

        let mut stream = group
            .streams
            .entry(stream_name.to_string())
            .or_insert_with(|| LogStream::new(stream_name, timestamp));

        let before = stream.events.len();
        for message in messages {
            stream.push(timestamp, message, timestamp);
        }

        debug!(
            log_group = %group_name,
            log_stream = %stream_name,
            appended = stream.events.len() - before,
            "Appended log events"
        );
    }

    /// Read one page of events from a stream
    ///
    /// Events come back oldest first. Without a token, `start_from_head`
    /// picks the first page; otherwise the newest `limit` events are
    /// returned. Tokens are `f/{index}` and `b/{index}` positions into the
    /// time-filtered event list.
    pub fn get_log_events(
        &self,
        scope: &AccountRegionKey,
        group_name: &str,
        stream_name: &str,
        query: &GetEventsQuery,
    ) -> Result<EventsPage, LogsError> {
        let region = self
            .regions
            .get(scope)
            .ok_or_else(|| LogsError::GroupNotFound(group_name.to_string()))?;
        let group = region
            .log_groups
            .get(group_name)
            .ok_or_else(|| LogsError::GroupNotFound(group_name.to_string()))?;
        let stream = group
            .streams
            .get(stream_name)
            .ok_or_else(|| LogsError::StreamNotFound(stream_name.to_string()))?;

        let mut events: Vec<&LogEvent> = stream
            .events
            .iter()
            .filter(|e| {
                let after_start = query.start_time.map_or(true, |t| e.timestamp >= t);
                let before_end = query.end_time.map_or(true, |t| e.timestamp < t);
                after_start && before_end
            })
            .collect();
        events.sort_by_key(|e| e.timestamp);

        let len = events.len();
        let limit = query.limit.unwrap_or(DEFAULT_EVENT_LIMIT).clamp(1, DEFAULT_EVENT_LIMIT);

        let (start, end) = match query.next_token.as_deref().map(parse_token).transpose()? {
            Some(Token::Forward(position)) => {
                let start = position.min(len);
                (start, start.saturating_add(limit).min(len))
            }
            Some(Token::Backward(position)) => {
                let end = position.min(len);
                (end.saturating_sub(limit), end)
            }
            None if query.start_from_head => (0, limit.min(len)),
            None => (len.saturating_sub(limit), len),
        };

        Ok(EventsPage {
            events: events[start..end].iter().map(|e| (*e).clone()).collect(),
            next_forward_token: format!("f/{:056}", end),
            next_backward_token: format!("b/{:056}", start),
        })
    }
}

/// State for CloudWatch Logs handlers
pub struct LogsState {
    pub storage: Arc<LogsStorage>,
}

impl LogsState {
    pub fn with_storage(storage: Arc<LogsStorage>) -> Self {
        Self { storage }
    }
}

enum Token {
    Forward(usize),
    Backward(usize),
}

fn parse_token(token: &str) -> Result<Token, LogsError> {
    let invalid = || LogsError::InvalidParameter(format!("Invalid nextToken: {}", token));

    let (direction, position) = token.split_once('/').ok_or_else(invalid)?;
    let position: usize = position.parse().map_err(|_| invalid())?;

    match direction {
        "f" => Ok(Token::Forward(position)),
        "b" => Ok(Token::Backward(position)),
        _ => Err(invalid()),
    }
}

fn validate_name(field: &str, name: &str) -> Result<(), LogsError> {
    let stream_with_colon = field == "logStreamName" && name.contains(':');
    if name.is_empty() || name.len() > 512 || stream_with_colon {
        return Err(LogsError::InvalidParameter(format!(
            "Invalid {}: {}",
            field, name
        )));
    }
    Ok(())
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> AccountRegionKey {
        AccountRegionKey::new("000000000000", "eu-west-1")
    }

    #[test]
    fn test_append_creates_group_and_stream() {
        let storage = LogsStorage::new();
        storage.append(
            &scope(),
            "/aws/lambda/fn",
            "2024/01/01/[$LATEST]abc",
            vec!["one".to_string(), "two".to_string()],
        );

        let groups = storage.describe_log_groups(&scope(), Some("/aws/lambda/"), None);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].log_group_name, "/aws/lambda/fn");
        assert_eq!(groups[0].stored_bytes, 6);

        let streams = storage
            .describe_log_streams(&scope(), "/aws/lambda/fn", &DescribeStreamsQuery::default())
            .unwrap();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].log_stream_name, "2024/01/01/[$LATEST]abc");

        let page = storage
            .get_log_events(
                &scope(),
                "/aws/lambda/fn",
                "2024/01/01/[$LATEST]abc",
                &GetEventsQuery::default(),
            )
            .unwrap();
        let messages: Vec<_> = page.events.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["one", "two"]);
    }

    #[test]
    fn test_regions_are_isolated() {
        let storage = LogsStorage::new();
        storage.create_log_group(&scope(), "group").unwrap();

        let other = AccountRegionKey::new("000000000000", "us-east-1");
        assert!(storage.describe_log_groups(&other, None, None).is_empty());
        assert!(matches!(
            storage.describe_log_streams(&other, "group", &DescribeStreamsQuery::default()),
            Err(LogsError::GroupNotFound(_))
        ));
    }

    #[test]
    fn test_create_duplicates_and_missing() {
        let storage = LogsStorage::new();
        storage.create_log_group(&scope(), "group").unwrap();
        assert_eq!(
            storage.create_log_group(&scope(), "group"),
            Err(LogsError::GroupAlreadyExists("group".to_string()))
        );

        storage.create_log_stream(&scope(), "group", "stream").unwrap();
        assert_eq!(
            storage.create_log_stream(&scope(), "group", "stream"),
            Err(LogsError::StreamAlreadyExists("stream".to_string()))
        );
        assert_eq!(
            storage.create_log_stream(&scope(), "missing", "stream"),
            Err(LogsError::GroupNotFound("missing".to_string()))
        );

        storage.delete_log_group(&scope(), "group").unwrap();
        assert_eq!(
            storage.delete_log_group(&scope(), "group"),
            Err(LogsError::GroupNotFound("group".to_string()))
        );
    }

    #[test]
    fn test_put_and_page_events() {
        let storage = LogsStorage::new();
        storage.create_log_group(&scope(), "group").unwrap();
        storage.create_log_stream(&scope(), "group", "stream").unwrap();

        let events = (0..5)
            .map(|i| InputLogEvent {
                timestamp: 1_000 + i,
                message: format!("event {}", i),
            })
            .collect();
        storage.put_log_events(&scope(), "group", "stream", events).unwrap();

        // Without a token the newest page is returned, oldest first
        let tail = storage
            .get_log_events(
                &scope(),
                "group",
                "stream",
                &GetEventsQuery {
                    limit: Some(2),
                    ..Default::default()
                },
            )
            .unwrap();
        let messages: Vec<_> = tail.events.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["event 3", "event 4"]);

        let head = storage
            .get_log_events(
                &scope(),
                "group",
                "stream",
                &GetEventsQuery {
                    limit: Some(2),
                    start_from_head: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(head.events[0].message, "event 0");

        let next = storage
            .get_log_events(
                &scope(),
                "group",
                "stream",
                &GetEventsQuery {
                    limit: Some(2),
                    next_token: Some(head.next_forward_token.clone()),
                    ..Default::default()
                },
            )
            .unwrap();
        let messages: Vec<_> = next.events.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["event 2", "event 3"]);

        let window = storage
            .get_log_events(
                &scope(),
                "group",
                "stream",
                &GetEventsQuery {
                    start_time: Some(1_001),
                    end_time: Some(1_003),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(window.events.len(), 2);
    }

    #[test]
    fn test_stream_ordering() {
        let storage = LogsStorage::new();
        storage.append(&scope(), "group", "b", vec!["x".to_string()]);
        storage.append(&scope(), "group", "a", vec!["y".to_string()]);

        let by_name = storage
            .describe_log_streams(&scope(), "group", &DescribeStreamsQuery::default())
            .unwrap();
        assert_eq!(by_name[0].log_stream_name, "a");

        let descending = storage
            .describe_log_streams(
                &scope(),
                "group",
                &DescribeStreamsQuery {
                    descending: true,
                    limit: Some(1),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(descending.len(), 1);
        assert_eq!(descending[0].log_stream_name, "b");
    }

    #[test]
    fn test_bad_token_rejected() {
        let storage = LogsStorage::new();
        storage.append(&scope(), "group", "stream", vec!["x".to_string()]);

        let result = storage.get_log_events(
            &scope(),
            "group",
            "stream",
            &GetEventsQuery {
                next_token: Some("nonsense".to_string()),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(LogsError::InvalidParameter(_))));
    }

    #[test]
    fn test_huge_limit_with_forward_token() {
        let storage = LogsStorage::new();
        storage.append(
            &scope(),
            "group",
            "stream",
            (0..3).map(|i| format!("event {}", i)),
        );

        let page = storage
            .get_log_events(
                &scope(),
                "group",
                "stream",
                &GetEventsQuery {
                    limit: Some(usize::MAX),
                    next_token: Some(format!("f/{:056}", 1)),
                    ..Default::default()
                },
            )
            .unwrap();
        let messages: Vec<_> = page.events.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["event 1", "event 2"]);
        assert_eq!(page.next_forward_token, format!("f/{:056}", 3));
    }
}
