//! Built-in shared infrastructure dependencies.

use serde::{Deserialize, Serialize};

/// A built-in dependency, discriminated by `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Dependency {
    Mongo,
    Redis,
    Postgres,
}

/// Fixed shape of the synthetic service a dependency expands into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyBlueprint {
    pub service_name: &'static str,
    pub image: &'static str,
    pub container_port: u16,
    pub host_port: u16,
    /// URL scheme clients use to connect (e.g. `mongodb`).
    pub scheme: &'static str,
    /// Named volume mounted at `data_path`.
    pub volume: &'static str,
    pub data_path: &'static str,
    pub command: &'static [&'static str],
    pub environment: &'static [(&'static str, &'static str)],
    /// Container health check command (compose `test` form), if any.
    pub healthcheck: &'static [&'static str],
}

/// Initiates the single-member replica set on first run and reports its
/// status afterwards. The member is advertised as `localhost:27217`, which
/// resolves to the same mongod inside the container and on the host.
const MONGO_REPLICA_SET_INIT: &str = "try { rs.status().ok } catch (e) { \
rs.initiate({_id:'rs0',members:[{_id:0,host:'localhost:27217'}]}).ok }";

impl Dependency {
    pub fn type_name(&self) -> &'static str {
        match self {
            Dependency::Mongo => "mongo",
            Dependency::Redis => "redis",
            Dependency::Postgres => "postgres",
        }
    }

    pub fn blueprint(&self) -> DependencyBlueprint {
        match self {
            Dependency::Mongo => DependencyBlueprint {
                service_name: "mongo",
                image: "mongo:7.0",
                container_port: 27217,
                host_port: 27217,
                scheme: "mongodb",
                volume: "devstack_mongo_data",
                data_path: "/data/db",
                command: &["--replSet", "rs0", "--bind_ip_all", "--port", "27217"],
                environment: &[],
                healthcheck: &[
                    "CMD",
                    "mongosh",
                    "--quiet",
                    "--port",
                    "27217",
                    "--eval",
                    MONGO_REPLICA_SET_INIT,
                ],
            },
            Dependency::Redis => DependencyBlueprint {
                service_name: "redis",
                image: "redis:7.2-alpine",
                container_port: 6379,
                host_port: 6380,
                scheme: "redis",
                volume: "devstack_redis_data",
                data_path: "/data",
                command: &[],
                environment: &[],
                healthcheck: &["CMD", "redis-cli", "ping"],
            },
            Dependency::Postgres => DependencyBlueprint {
                service_name: "postgres",
                image: "postgres:16-alpine",
                container_port: 5432,
                host_port: 5433,
                scheme: "postgres",
                volume: "devstack_postgres_data",
                data_path: "/var/lib/postgresql/data",
                command: &[],
                environment: &[
                    ("POSTGRES_PASSWORD", "postgres"),
                    ("POSTGRES_HOST_AUTH_METHOD", "trust"),
                ],
                healthcheck: &["CMD", "pg_isready", "-U", "postgres"],
            },
        }
    }
}
