//! Database schema and migrations

use anyhow::Result;
use deadpool_postgres::Object;
use tracing::info;

pub async fn run_migrations(client: &Object) -> Result<()> {
    client.batch_execute(SCHEMA_SQL).await?;

    client
        .execute(
            "INSERT INTO schema_state (key, value) VALUES ('schema_version', $1)
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
            &[&SCHEMA_VERSION],
        )
        .await?;

    info!("Database migrations applied (schema {})", SCHEMA_VERSION);
    Ok(())
}

pub const SCHEMA_VERSION: &str = "1";

const SCHEMA_SQL: &str = r#"
-- Recharge draw schema

-- Prize structures and their ordered tiers
CREATE TABLE IF NOT EXISTS prize_structures (
    id UUID PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS prize_tiers (
    id UUID PRIMARY KEY,
    prize_structure_id UUID NOT NULL REFERENCES prize_structures(id) ON DELETE CASCADE,
    -- Draw order within the structure
    position INTEGER NOT NULL,
    name VARCHAR(255) NOT NULL,
    -- Minor currency units
    value BIGINT NOT NULL CHECK (value >= 0),
    quantity INTEGER NOT NULL CHECK (quantity >= 1),
    -- NULL means max(1, quantity / 2)
    runner_up_count INTEGER CHECK (runner_up_count >= 0),
    UNIQUE (prize_structure_id, position)
);

-- Raw recharge events, aggregated per UTC day into entries
CREATE TABLE IF NOT EXISTS recharges (
    id BIGSERIAL PRIMARY KEY,
    msisdn VARCHAR(32) NOT NULL,
    amount BIGINT NOT NULL CHECK (amount >= 0),
    recharged_at TIMESTAMPTZ NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_recharges_time ON recharges(recharged_at);

-- One draw per calendar date
CREATE TABLE IF NOT EXISTS draws (
    id UUID PRIMARY KEY,
    draw_date DATE NOT NULL UNIQUE,
    prize_structure_id UUID NOT NULL REFERENCES prize_structures(id),
    status VARCHAR(16) NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'completed', 'failed')),
    total_eligible_participants BIGINT NOT NULL DEFAULT 0,
    total_entries BIGINT NOT NULL DEFAULT 0,
    executed_by VARCHAR(255) NOT NULL,
    -- Hex seed, pool digest and strategy for replay
    seed VARCHAR(64),
    entries_digest VARCHAR(64),
    strategy VARCHAR(32),
    failure_reason TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CHECK ((status = 'failed') = (failure_reason IS NOT NULL))
);

CREATE INDEX IF NOT EXISTS idx_draws_status ON draws(status);

-- Winners and runner-ups; rows are never deleted
CREATE TABLE IF NOT EXISTS winners (
    id UUID PRIMARY KEY,
    draw_id UUID NOT NULL REFERENCES draws(id),
    msisdn VARCHAR(32) NOT NULL,
    prize_tier_id UUID NOT NULL REFERENCES prize_tiers(id),
    status VARCHAR(32) NOT NULL DEFAULT 'pending_notification'
        CHECK (status IN ('pending_notification', 'notified', 'confirmed', 'replaced')),
    payment_status VARCHAR(16) NOT NULL DEFAULT 'pending'
        CHECK (payment_status IN ('pending', 'paid', 'failed')),
    paid_at TIMESTAMPTZ,
    payment_note TEXT,
    is_runner_up BOOLEAN NOT NULL DEFAULT FALSE,
    -- Kept after promotion
    runner_up_rank INTEGER CHECK (runner_up_rank >= 1),
    replaced_by UUID REFERENCES winners(id),
    replacement_reason TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (draw_id, msisdn),
    UNIQUE (draw_id, prize_tier_id, runner_up_rank),
    CHECK ((payment_status = 'paid') = (paid_at IS NOT NULL))
);

CREATE INDEX IF NOT EXISTS idx_winners_draw ON winners(draw_id);
CREATE INDEX IF NOT EXISTS idx_winners_tier ON winners(draw_id, prize_tier_id);

-- Append-only audit trail
CREATE TABLE IF NOT EXISTS audit_events (
    id BIGSERIAL PRIMARY KEY,
    action VARCHAR(64) NOT NULL,
    entity_type VARCHAR(64) NOT NULL,
    entity_id VARCHAR(128) NOT NULL,
    actor VARCHAR(255) NOT NULL,
    summary TEXT NOT NULL,
    detail JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_audit_action ON audit_events(action);
CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_events(entity_type, entity_id);
CREATE INDEX IF NOT EXISTS idx_audit_created ON audit_events(created_at DESC);

CREATE TABLE IF NOT EXISTS schema_state (
    key VARCHAR(64) PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;
