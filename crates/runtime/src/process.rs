//! Pid liveness checks used to decide whether a run lock is still held.

/// Returns `true` when a process with `pid` appears alive on this platform.
///
/// Pid `0` is never alive. On platforms without a probe only the current
/// process is reported alive.
pub fn pid_is_alive(pid: u32) -> bool {
	if pid == 0 {
		return false;
	}
	if pid == std::process::id() {
		return true;
	}

	#[cfg(target_os = "linux")]
	{
		std::path::Path::new("/proc").join(pid.to_string()).exists()
	}

	#[cfg(all(unix, not(target_os = "linux")))]
	{
		std::process::Command::new("kill")
			.args(["-0", &pid.to_string()])
			.stderr(std::process::Stdio::null())
			.status()
			.is_ok_and(|status| status.success())
	}

	#[cfg(windows)]
	{
		let filter = format!("PID eq {pid}");
		std::process::Command::new("tasklist")
			.args(["/FI", &filter, "/FO", "CSV", "/NH"])
			.output()
			.is_ok_and(|output| output.status.success() && tasklist_lists_pid(&String::from_utf8_lossy(&output.stdout), pid))
	}

	#[cfg(not(any(unix, windows)))]
	{
		false
	}
}

/// Parses `tasklist /FO CSV /NH` output for a row whose pid column is `pid`.
#[cfg(any(test, windows))]
fn tasklist_lists_pid(output: &str, pid: u32) -> bool {
	let wanted = pid.to_string();
	output
		.lines()
		.filter_map(|line| line.trim().strip_prefix('"'))
		.any(|row| row.split("\",\"").nth(1).is_some_and(|col| col.trim_end_matches('"') == wanted))
}
