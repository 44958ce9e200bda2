//! Execution Timeline
//!
//! Tracks when each node visit starts and finishes, for duration reports
//! and Gantt charts. A visit is identified by node id and path id, so a
//! node reached by two paths shows up as two bars.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Type of timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Node dispatched to its handler
    Started,
    /// Handler finished and the path may continue
    Completed,
    /// Handler failed or no branch matched
    Failed,
}

/// A single event in the execution timeline.
#[derive(Debug, Clone)]
pub struct TimelineEvent {
    pub node_id: String,
    pub path_id: u64,
    pub event_type: EventType,
    pub timestamp: Instant,
}

impl TimelineEvent {
    /// Chart label: the node id, suffixed with the path for forked paths.
    pub fn label(&self) -> String {
        visit_label(&self.node_id, self.path_id)
    }
}

fn visit_label(node_id: &str, path_id: u64) -> String {
    if path_id == 0 {
        node_id.to_string()
    } else {
        format!("{}#{}", node_id, path_id)
    }
}

/// Tracks the execution timeline of a run.
#[derive(Debug, Clone)]
pub struct ExecutionTimeline {
    events: Vec<TimelineEvent>,
    start_time: Instant,
}

impl ExecutionTimeline {
    /// Creates a new timeline starting now.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            start_time: Instant::now(),
        }
    }

    /// Records an event for a node visit.
    pub fn add_event(&mut self, node_id: &str, path_id: u64, event_type: EventType) {
        self.events.push(TimelineEvent {
            node_id: node_id.to_string(),
            path_id,
            event_type,
            timestamp: Instant::now(),
        });
    }

    /// Returns all recorded events.
    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    /// Returns true if the node was ever started on any path.
    pub fn was_started(&self, node_id: &str) -> bool {
        self.events
            .iter()
            .any(|e| e.node_id == node_id && e.event_type == EventType::Started)
    }

    /// Returns the total elapsed time since timeline creation.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Generates an ASCII Gantt chart, one bar per finished visit.
    pub fn gantt_chart(&self) -> String {
        let mut output = String::from("\nExecution Timeline:\n\n");

        let total_time = self.elapsed().as_millis();
        if total_time == 0 {
            return output;
        }

        // Scale to 50 characters width
        let scale = 50.0 / total_time as f64;

        let mut spans = self.spans();
        spans.sort_by_key(|(_, (start, _))| *start);

        for (label, (start, end)) in spans {
            if end < start {
                continue;
            }
            let start_pos = (start as f64 * scale) as usize;
            let duration = ((end - start) as f64 * scale).max(1.0) as usize;

            let mut bar = " ".repeat(start_pos);
            bar.push_str(&"#".repeat(duration));

            output.push_str(&format!(
                "{:12} |{}| ({} ms)\n",
                truncate(&label, 12),
                bar,
                end - start
            ));
        }

        output.push_str(&format!("\nTotal: {} ms\n", total_time));
        output
    }

    /// Returns visit durations in milliseconds, keyed by visit label.
    ///
    /// When a path visits a node repeatedly, the last visit wins.
    pub fn durations(&self) -> HashMap<String, u128> {
        self.spans()
            .into_iter()
            .map(|(label, (start, end))| (label, end.saturating_sub(start)))
            .collect()
    }

    /// (start, end) offsets in ms of every finished visit.
    fn spans(&self) -> Vec<(String, (u128, u128))> {
        let mut starts: HashMap<String, u128> = HashMap::new();
        let mut spans: HashMap<String, (u128, u128)> = HashMap::new();

        for event in &self.events {
            let elapsed = event.timestamp.duration_since(self.start_time).as_millis();
            match event.event_type {
                EventType::Started => {
                    starts.insert(event.label(), elapsed);
                }
                EventType::Completed | EventType::Failed => {
                    if let Some(start) = starts.get(&event.label()) {
                        spans.insert(event.label(), (*start, elapsed));
                    }
                }
            }
        }

        spans.into_iter().collect()
    }
}

impl Default for ExecutionTimeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Pads or truncates a label to a fixed width.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        format!("{:width$}", s, width = max_len)
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_timeline_creation() {
        let timeline = ExecutionTimeline::new();
        assert!(timeline.events.is_empty());
    }

    #[test]
    fn test_durations() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event("fetch", 0, EventType::Started);
        thread::sleep(Duration::from_millis(50));
        timeline.add_event("fetch", 0, EventType::Completed);

        let durations = timeline.durations();
        assert!(*durations.get("fetch").unwrap() >= 50);
    }

    #[test]
    fn test_paths_tracked_separately() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event("join", 0, EventType::Started);
        timeline.add_event("join", 3, EventType::Started);
        timeline.add_event("join", 3, EventType::Failed);
        timeline.add_event("join", 0, EventType::Completed);

        let durations = timeline.durations();
        assert!(durations.contains_key("join"));
        assert!(durations.contains_key("join#3"));
    }

    #[test]
    fn test_only_started_has_no_duration() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event("wait", 0, EventType::Started);

        assert!(timeline.durations().is_empty());
        assert!(timeline.was_started("wait"));
        assert!(!timeline.was_started("other"));
    }

    #[test]
    fn test_gantt_chart_generation() {
        let mut timeline = ExecutionTimeline::new();

        timeline.add_event("start", 0, EventType::Started);
        thread::sleep(Duration::from_millis(20));
        timeline.add_event("start", 0, EventType::Completed);
        timeline.add_event("a_very_long_node_name", 1, EventType::Started);
        thread::sleep(Duration::from_millis(20));
        timeline.add_event("a_very_long_node_name", 1, EventType::Completed);

        let chart = timeline.gantt_chart();
        assert!(chart.contains("start"));
        assert!(chart.contains("a_very_lo..."));
        assert!(chart.contains("Total:"));
    }

    #[test]
    fn test_gantt_chart_empty() {
        let timeline = ExecutionTimeline::default();
        assert!(timeline.gantt_chart().contains("Timeline"));
    }
}
