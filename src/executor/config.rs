// Executor configuration

/// Executor configuration
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Remote-shell client
    pub ssh_program: String,
    /// Password-feeding front end for the ssh client
    pub sshpass_program: String,
    /// File-copy client for artifact downloads
    pub scp_program: String,
    /// Passed to ssh/scp as `-o ConnectTimeout=<n>`
    pub connect_timeout_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            ssh_program: String::from("ssh"),
            sshpass_program: String::from("sshpass"),
            scp_program: String::from("scp"),
            connect_timeout_secs: 10,
        }
    }
}
