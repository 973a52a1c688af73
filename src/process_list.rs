//! `ps`-based process listing (spec §6 "Process-list parsing").
//!
//! The parser itself is in scope; the chroot/subprocess glue that
//! invokes `ps` inside a container's root is thin plumbing kept in
//! `tracker::ContainerTracker::process_list` and is not re-tested here.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// The exact column set the core expects from the `ps` invocation.
pub const PS_ARGS: &str = "user,pid,ppid,stime,pcpu,pmem,rss,vsz,stat,time,comm,cgroup";

const MIN_FIELDS: usize = 12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub user: String,
    pub pid: u32,
    pub ppid: u32,
    pub stime: String,
    pub pcpu: f64,
    pub pmem: f64,
    pub rss_bytes: u64,
    pub vsz_bytes: u64,
    pub stat: String,
    pub cpu_time: String,
    pub command: String,
    /// Populated only for the root tracker (`name == "/"`); empty for
    /// non-root trackers (spec §8 scenario 6).
    pub cgroup_path: Option<String>,
}

fn cgroup_regex() -> Regex {
    Regex::new(r"devices[^:]*:(.*?)[,;$]").expect("static regex is valid")
}

/// Parse one non-header `ps` output line into a `ProcessInfo`, or
/// `None` if it has fewer than `MIN_FIELDS` whitespace-separated
/// fields.
fn parse_line(line: &str, re: &Regex) -> Option<ProcessInfo> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < MIN_FIELDS {
        return None;
    }

    let rss_kib: u64 = fields[6].parse().ok()?;
    let vsz_kib: u64 = fields[7].parse().ok()?;
    let cgroup_raw = fields[11..].join(" ");
    let cgroup = re
        .captures(&cgroup_raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "/".to_string());

    Some(ProcessInfo {
        user: fields[0].to_string(),
        pid: fields[1].parse().ok()?,
        ppid: fields[2].parse().ok()?,
        stime: fields[3].to_string(),
        pcpu: fields[4].parse().ok()?,
        pmem: fields[5].parse().ok()?,
        rss_bytes: rss_kib * 1024,
        vsz_bytes: vsz_kib * 1024,
        stat: fields[8].to_string(),
        cpu_time: fields[9].to_string(),
        command: fields[10].to_string(),
        cgroup_path: Some(cgroup),
    })
}

/// Parse a full `ps -e -o user,pid,ppid,stime,pcpu,pmem,rss,vsz,stat,time,comm,cgroup`
/// output (including its header line) for `tracker_name`.
///
/// For the root tracker (`"/"`), every parsed row is returned with its
/// cgroup path populated. For non-root trackers, only rows whose
/// parsed cgroup equals `tracker_name` are returned, and `cgroup_path`
/// is cleared on each (spec §8 scenarios 5–6).
///
/// `own_pid`, when set, excludes that PID from the result — the
/// agent's own `ps` invocation, visible only when probing from inside
/// the agent's own container.
pub fn parse_ps_output(
    output: &str,
    tracker_name: &str,
    own_pid: Option<u32>,
) -> Vec<ProcessInfo> {
    let re = cgroup_regex();
    let is_root = tracker_name == "/";

    output
        .lines()
        .skip(1) // header
        .filter_map(|line| parse_line(line, &re))
        .filter(|p| own_pid != Some(p.pid))
        .filter_map(|mut p| {
            if is_root {
                Some(p)
            } else if p.cgroup_path.as_deref() == Some(tracker_name) {
                p.cgroup_path = None;
                Some(p)
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "USER       PID  PPID STIME %CPU %MEM   RSS    VSZ STAT TIME COMMAND CGROUP";

    fn line(user: &str, pid: u32, ppid: u32, rss_kib: u64, comm: &str, cgroup: &str) -> String {
        format!(
            "{user} {pid} {ppid} 10:00 0.5 1.2 {rss_kib} 2048 Ss 00:00:01 {comm} {cgroup}",
        )
    }

    #[test]
    fn root_tracker_reports_every_process_with_cgroup() {
        // spec §8 scenario 5
        let body = vec![
            line("root", 1, 0, 1024, "init", "12:devices:/,11:cpu:/"),
            line("alice", 50, 1, 2048, "bash", "12:devices:/docker/abc,11:cpu:/docker/abc"),
            line("bob", 60, 1, 4096, "sh", "12:devices:/docker/def,11:cpu:/docker/def"),
        ];
        let output = format!("{HEADER}\n{}", body.join("\n"));
        let procs = parse_ps_output(&output, "/", None);
        assert_eq!(procs.len(), 3);
        assert!(procs.iter().all(|p| p.cgroup_path.is_some()));
        assert_eq!(procs[0].rss_bytes, 1024 * 1024);
    }

    #[test]
    fn container_scoped_listing_filters_by_cgroup() {
        // spec §8 scenario 6
        let body = vec![
            line("root", 1, 0, 1024, "init", "12:devices:/,11:cpu:/"),
            line(
                "alice",
                50,
                1,
                2048,
                "bash",
                "12:devices:/sys/fs/cgroup/docker/abc,11:cpu:/sys/fs/cgroup/docker/abc",
            ),
            line("bob", 60, 1, 4096, "sh", "12:devices:/docker/def,11:cpu:/docker/def"),
        ];
        let output = format!("{HEADER}\n{}", body.join("\n"));
        let procs = parse_ps_output(&output, "/sys/fs/cgroup/docker/abc", None);
        assert_eq!(procs.len(), 1);
        assert_eq!(procs[0].command, "bash");
        assert!(procs[0].cgroup_path.is_none());
    }

    #[test]
    fn lines_with_too_few_fields_are_rejected() {
        let output = format!("{HEADER}\nroot 1 0 10:00 0.5");
        let procs = parse_ps_output(&output, "/", None);
        assert!(procs.is_empty());
    }

    #[test]
    fn missing_devices_hierarchy_defaults_to_root() {
        let body = line("root", 1, 0, 1024, "init", "11:cpu:/");
        let output = format!("{HEADER}\n{body}");
        let procs = parse_ps_output(&output, "/", None);
        assert_eq!(procs.len(), 1);
        assert_eq!(procs[0].cgroup_path.as_deref(), Some("/"));
    }

    #[test]
    fn own_pid_is_excluded() {
        let body = vec![
            line("root", 1, 0, 1024, "init", "12:devices:/,11:cpu:/"),
            line("root", 99, 1, 512, "ps", "12:devices:/,11:cpu:/"),
        ];
        let output = format!("{HEADER}\n{}", body.join("\n"));
        let procs = parse_ps_output(&output, "/", Some(99));
        assert_eq!(procs.len(), 1);
        assert_eq!(procs[0].pid, 1);
    }

    #[test]
    fn rss_and_vsz_convert_kib_to_bytes() {
        let body = line("root", 1, 0, 1024, "init", "12:devices:/,11:cpu:/");
        let output = format!("{HEADER}\n{body}");
        let procs = parse_ps_output(&output, "/", None);
        assert_eq!(procs[0].rss_bytes, 1_048_576);
        assert_eq!(procs[0].vsz_bytes, 2_097_152);
    }
}
