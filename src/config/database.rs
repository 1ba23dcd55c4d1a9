#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Initialize database tables and stored procedures if they don't exist.
///
/// Tables and procedures mirror spec §6's persisted-state layout exactly:
/// `rooms`, `room_secrets`, `files`, `access_logs`, `room_presence`,
/// `room_user_counter`, `room_user_index`, plus the three atomic-increment
/// stored procedures `assign_user_number`, `increment_remaining_files`,
/// `decrement_remaining_files`.
pub async fn init_tables(pool: &sqlx::PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Checking and creating database tables...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rooms (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL,
            author_display_name TEXT NOT NULL,
            mode TEXT NOT NULL DEFAULT 'normal',
            status TEXT NOT NULL DEFAULT 'active',
            expires_at TIMESTAMPTZ NOT NULL,
            is_permanent BOOLEAN NOT NULL DEFAULT FALSE,
            capacity INTEGER NOT NULL DEFAULT 999,
            remaining_files INTEGER NOT NULL DEFAULT 0,
            download_lock_count INTEGER NOT NULL DEFAULT 0,
            last_download_activity TIMESTAMPTZ,
            termination_started_at TIMESTAMPTZ,
            file_count BIGINT NOT NULL DEFAULT 0,
            total_size_bytes BIGINT NOT NULL DEFAULT 0,
            max_files BIGINT NOT NULL,
            max_total_size_bytes BIGINT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS room_secrets (
            room_id UUID PRIMARY KEY REFERENCES rooms(id) ON DELETE CASCADE,
            password_hash TEXT NOT NULL,
            author_token TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            id UUID PRIMARY KEY,
            room_id UUID NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
            filename TEXT NOT NULL,
            blob_key TEXT NOT NULL,
            size_bytes BIGINT NOT NULL,
            content_type TEXT,
            download_count INTEGER NOT NULL DEFAULT 0,
            file_status TEXT NOT NULL DEFAULT 'live',
            burn_after_download BOOLEAN NOT NULL DEFAULT FALSE,
            scan_status TEXT NOT NULL DEFAULT 'unknown',
            scan_result TEXT,
            message TEXT,
            target_url TEXT,
            description TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS room_presence (
            room_id UUID NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
            device TEXT NOT NULL,
            is_author BOOLEAN NOT NULL DEFAULT FALSE,
            status TEXT NOT NULL DEFAULT 'active',
            last_seen_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (room_id, device)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS room_user_counter (
            room_id UUID PRIMARY KEY REFERENCES rooms(id) ON DELETE CASCADE,
            next_number INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS room_user_index (
            room_id UUID NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
            device TEXT NOT NULL,
            guest_number INTEGER NOT NULL,
            PRIMARY KEY (room_id, device)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS access_logs (
            id UUID PRIMARY KEY,
            room_id UUID NOT NULL,
            event_type TEXT NOT NULL,
            device TEXT,
            session TEXT,
            ip TEXT,
            user_agent TEXT,
            browser TEXT,
            os TEXT,
            device_type TEXT,
            country TEXT,
            city TEXT,
            region TEXT,
            postal_code TEXT,
            timezone TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Dedup at the database level for `file_download` events (spec §4.G,
    // §4.K): repeated /download/end calls for the same device must yield a
    // single log row even across process restarts, since the in-process
    // dedup cache is best-effort only.
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS access_logs_file_download_dedup
        ON access_logs (room_id, device, event_type)
        WHERE event_type = 'file_download'
        "#,
    )
    .execute(pool)
    .await
    .ok();

    sqlx::query(
        r#"
        CREATE OR REPLACE FUNCTION assign_user_number(p_room_id UUID, p_device TEXT)
        RETURNS INTEGER AS $$
        DECLARE
            v_number INTEGER;
        BEGIN
            SELECT guest_number INTO v_number
            FROM room_user_index
            WHERE room_id = p_room_id AND device = p_device;

            IF FOUND THEN
                RETURN v_number;
            END IF;

            INSERT INTO room_user_counter (room_id, next_number)
            VALUES (p_room_id, 2)
            ON CONFLICT (room_id) DO UPDATE
            SET next_number = room_user_counter.next_number + 1
            RETURNING next_number - 1 INTO v_number;

            BEGIN
                INSERT INTO room_user_index (room_id, device, guest_number)
                VALUES (p_room_id, p_device, v_number);
            EXCEPTION WHEN unique_violation THEN
                SELECT guest_number INTO v_number
                FROM room_user_index
                WHERE room_id = p_room_id AND device = p_device;
            END;

            RETURN v_number;
        END;
        $$ LANGUAGE plpgsql;
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE OR REPLACE FUNCTION increment_remaining_files(p_room_id UUID)
        RETURNS INTEGER AS $$
        DECLARE
            v_remaining INTEGER;
        BEGIN
            UPDATE rooms SET remaining_files = remaining_files + 1
            WHERE id = p_room_id
            RETURNING remaining_files INTO v_remaining;
            RETURN v_remaining;
        END;
        $$ LANGUAGE plpgsql;
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE OR REPLACE FUNCTION decrement_remaining_files(p_room_id UUID)
        RETURNS INTEGER AS $$
        DECLARE
            v_remaining INTEGER;
        BEGIN
            UPDATE rooms SET remaining_files = GREATEST(remaining_files - 1, 0)
            WHERE id = p_room_id
            RETURNING remaining_files INTO v_remaining;
            RETURN v_remaining;
        END;
        $$ LANGUAGE plpgsql;
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables and stored procedures ready");

    Ok(())
}
