use tokio::process::Child;

/// Grace period between SIGTERM and the hard kill.
#[cfg(unix)]
const TERM_GRACE: std::time::Duration = std::time::Duration::from_millis(500);

#[cfg(unix)]
pub async fn kill_graceful(child: &mut Child) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
        if tokio::time::timeout(TERM_GRACE, child.wait()).await.is_ok() {
            return;
        }
    }
    let _ = child.kill().await;
}

#[cfg(not(unix))]
pub async fn kill_graceful(child: &mut Child) {
    let _ = child.kill().await;
}
