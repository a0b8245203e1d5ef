use serde_json::{json, Map, Value};
use uuid::Uuid;

use concierge_core::{Thread, UserConfig};

use crate::connection::DbPool;
use crate::repositories::{
    DocumentChunk, DocumentChunkRepository, RepositoryError, SqlDocumentChunkRepository,
    SqlThreadRepository, SqlUserConfigRepository, ThreadRepository, UserConfigRepository,
};

/// Deterministic demo tenant used by `concierge seed` and the end-to-end
/// walkthrough. Fixed ids so repeated seeding is idempotent.
pub const SEED_USER_CONFIG_ID: Uuid = Uuid::from_u128(0x00000000_0000_4000_8000_000000000001);
pub const SEED_THREAD_ID: Uuid = Uuid::from_u128(0x00000000_0000_4000_8000_000000000002);

const SEED_CHUNKS: &[(&str, &str)] = &[
    (
        "Ada Lovelace, Analytical Engines Ltd. Interested in compiler tooling and \
         developer platforms. Looking for integration partners.",
        "attendee-profiles",
    ),
    (
        "Grace Hopper, Flowmatic Systems. Compiler pioneer, interested in language \
         standardization and enterprise tooling.",
        "attendee-profiles",
    ),
    (
        "Alan Turing, Universal Machines. Research lead, interested in computability \
         and early-stage hardware ventures.",
        "attendee-profiles",
    ),
];

pub struct SeedDataset;

#[derive(Debug)]
pub struct SeedResult {
    pub user_config_id: Uuid,
    pub thread_id: Uuid,
    pub chunks_seeded: usize,
}

impl SeedDataset {
    /// Load the demo tenant, one thread and the attendee chunk index.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let user_config_repo = SqlUserConfigRepository::new(pool.clone());
        let thread_repo = SqlThreadRepository::new(pool.clone());
        let chunk_repo = SqlDocumentChunkRepository::new(pool.clone());

        let mut config = Map::new();
        config.insert("api_url".to_string(), json!("https://meetings.example/api"));
        config.insert("event_id".to_string(), json!(1));

        let now = chrono::Utc::now();
        let user_config = UserConfig {
            id: SEED_USER_CONFIG_ID,
            description: Some("Demo expo tenant".to_string()),
            config,
            active: true,
            created_at: now,
            updated_at: now,
        };
        user_config_repo.save(user_config).await?;

        let mut user_data = Map::new();
        user_data.insert("user_id".to_string(), json!(1));
        let thread = Thread {
            id: SEED_THREAD_ID,
            user_config_id: SEED_USER_CONFIG_ID,
            user_data,
            created_at: now,
            updated_at: now,
        };
        thread_repo.save(thread).await?;

        let mut chunks_seeded = 0;
        for (index, (content, source)) in SEED_CHUNKS.iter().enumerate() {
            let mut metadata = Map::new();
            metadata
                .insert("user_config_id".to_string(), json!(SEED_USER_CONFIG_ID.to_string()));
            let chunk = DocumentChunk {
                id: Uuid::from_u128(0x00000000_0000_4000_8000_000000000100 + index as u128),
                source: (*source).to_string(),
                content: (*content).to_string(),
                metadata,
                created_at: now,
            };
            chunk_repo.save(chunk).await?;
            chunks_seeded += 1;
        }

        Ok(SeedResult {
            user_config_id: SEED_USER_CONFIG_ID,
            thread_id: SEED_THREAD_ID,
            chunks_seeded,
        })
    }

    /// Verify the seed contract: tenant present and active, thread owned by
    /// it, all chunks indexed under its id.
    pub async fn verify(pool: &DbPool) -> Result<bool, RepositoryError> {
        let user_config_repo = SqlUserConfigRepository::new(pool.clone());
        let thread_repo = SqlThreadRepository::new(pool.clone());
        let chunk_repo = SqlDocumentChunkRepository::new(pool.clone());

        let tenant_ok = user_config_repo
            .find_by_id(&SEED_USER_CONFIG_ID)
            .await?
            .map(|config| config.active)
            .unwrap_or(false);

        let thread_ok = thread_repo
            .find_by_id(&SEED_THREAD_ID)
            .await?
            .map(|thread| thread.user_config_id == SEED_USER_CONFIG_ID)
            .unwrap_or(false);

        let mut filters = Map::new();
        filters.insert(
            "user_config_id".to_string(),
            Value::String(SEED_USER_CONFIG_ID.to_string()),
        );
        let chunks_ok = chunk_repo.list_matching(&filters).await?.len() == SEED_CHUNKS.len();

        Ok(tenant_ok && thread_ok && chunks_ok)
    }
}
