use anyhow::{bail, Result};
use tokio::process::Command;
use tracing::debug;

/// Applies the goose-format SQL migrations by spawning the goose binary.
pub struct MigrationRunner {
    goose_binary_path: String,
    migrations_dir: String,
    dsn: String,
}

impl MigrationRunner {
    pub fn new(goose_binary_path: String, migrations_dir: String, dsn: String) -> Self {
        Self {
            goose_binary_path,
            migrations_dir,
            dsn,
        }
    }

    /// Runs `goose -dir <dir> postgres <dsn> up`
    pub async fn run_migrations(&self) -> Result<()> {
        debug!(migrations_dir = %self.migrations_dir, "running migrations");
        let stdout = self.goose("up").await?;
        debug!("migrations completed:\n{}", stdout);
        Ok(())
    }

    pub async fn migration_status(&self) -> Result<String> {
        self.goose("status").await
    }

    async fn goose(&self, command: &str) -> Result<String> {
        let output = Command::new(&self.goose_binary_path)
            .arg("-dir")
            .arg(&self.migrations_dir)
            .arg("postgres")
            .arg(&self.dsn)
            .arg(command)
            .output()
            .await?;

        if !output.status.success() {
            bail!(
                "goose {} failed.\nstdout: {}\nstderr: {}",
                command,
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}
