use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_postgres::config::SslMode as PgSslMode;
use tokio_postgres::{Client, Config, NoTls};
use tracing::{error, info, warn};

use crate::config::{SslMode, TargetConfig};
use crate::Result;

/// Reported to the server as `application_name` for every session.
pub const APPLICATION_NAME: &str = "pg-apply";

/// The database batches are applied to.
///
/// `execute` receives one complete unit (`BEGIN; ...; COMMIT`) and must submit
/// it as a single request.
pub trait TargetDatabase: Send + Sync {
    fn execute<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// PostgreSQL target over a dedicated `tokio-postgres` connection.
///
/// A session that was closed by the server or the network is replaced on the
/// next [`TargetDatabase::execute`], so a retried batch runs on a fresh
/// connection.
pub struct PostgresTarget {
    config: Config,
    session: Mutex<Session>,
}

struct Session {
    client: Client,
    connection_task: JoinHandle<()>,
}

impl Session {
    async fn open(config: &Config) -> Result<Self> {
        let (client, connection) = config.connect(NoTls).await?;

        let connection_task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("Connection error: {}", e);
            }
        });

        Ok(Self {
            client,
            connection_task,
        })
    }

    async fn close(self) {
        drop(self.client);
        if let Err(e) = self.connection_task.await {
            warn!("Connection task ended abnormally: {}", e);
        }
    }
}

impl PostgresTarget {
    pub async fn connect(target: &TargetConfig) -> Result<Self> {
        info!(
            host = %target.host,
            port = target.port,
            database = %target.database,
            "Connecting to target PostgreSQL"
        );

        let mut config = Config::new();
        config
            .host(&target.host)
            .port(target.port)
            .dbname(&target.database)
            .user(&target.username)
            .password(&target.password)
            .application_name(APPLICATION_NAME)
            .connect_timeout(target.connect_timeout())
            .ssl_mode(match target.ssl_mode {
                SslMode::Disable => PgSslMode::Disable,
                SslMode::Prefer => PgSslMode::Prefer,
                SslMode::Require => PgSslMode::Require,
            });

        let session = Session::open(&config).await?;
        info!("Successfully connected to target PostgreSQL");

        Ok(Self {
            config,
            session: Mutex::new(session),
        })
    }

    pub async fn close(self) -> Result<()> {
        info!("Closing target connection");
        self.session.into_inner().close().await;
        Ok(())
    }
}

impl TargetDatabase for PostgresTarget {
    fn execute<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut session = self.session.lock().await;

            if session.client.is_closed() {
                warn!("Target connection is closed, reconnecting");
                let fresh = Session::open(&self.config).await?;
                std::mem::replace(&mut *session, fresh).close().await;
                info!("Reconnected to target PostgreSQL");
            }

            if let Err(e) = session.client.batch_execute(query).await {
                // A failure inside BEGIN..COMMIT leaves the session in an aborted
                // transaction until it is rolled back.
                if !e.is_closed() {
                    if let Err(rollback) = session.client.batch_execute("ROLLBACK").await {
                        warn!("Rollback after failed batch also failed: {}", rollback);
                    }
                }
                return Err(e.into());
            }
            Ok(())
        })
    }
}
