//! SQLite-backed persistence for users and trips.
//! Itineraries and location history are stored as JSON columns.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use tripbell_core::error::{Result, TripbellError};
use tripbell_core::traits::TripStore;
use tripbell_core::types::{Itinerary, Location, Trip, User, Weekdays};

const TRIP_COLUMNS: &str = "id, user_id, name, from_id, from_name, to_id, to_name, time, departure,
     monday, tuesday, wednesday, thursday, friday, saturday, sunday, itinerary";

fn db_err(context: &str) -> impl Fn(rusqlite::Error) -> TripbellError + '_ {
    move |e| TripbellError::Database(format!("{context}: {e}"))
}

/// SQLite trip store.
pub struct SqliteTripStore {
    conn: Mutex<Connection>,
}

impl SqliteTripStore {
    /// Open or create the trip database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err("DB open"))?;
        tracing::info!("🗄️ Trip store opened at {}", path.display());
        Self::with_connection(conn)
    }

    /// Fresh in-memory database (tests, dry runs).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err("DB open"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| TripbellError::Database("connection mutex poisoned".into()))
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                channel_id TEXT NOT NULL,
                locations TEXT NOT NULL DEFAULT '[]'   -- JSON array, most recent last
            );

            CREATE TABLE IF NOT EXISTS trips (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                from_id TEXT NOT NULL,
                from_name TEXT NOT NULL,
                to_id TEXT NOT NULL,
                to_name TEXT NOT NULL,
                time TEXT NOT NULL,
                departure INTEGER NOT NULL DEFAULT 1,
                monday INTEGER NOT NULL DEFAULT 1,
                tuesday INTEGER NOT NULL DEFAULT 1,
                wednesday INTEGER NOT NULL DEFAULT 1,
                thursday INTEGER NOT NULL DEFAULT 1,
                friday INTEGER NOT NULL DEFAULT 1,
                saturday INTEGER NOT NULL DEFAULT 1,
                sunday INTEGER NOT NULL DEFAULT 1,
                itinerary TEXT NOT NULL,              -- JSON
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_trips_user ON trips(user_id);
         ",
            )
            .map_err(db_err("Migration"))
    }

    // ─── Users ────────────────────────────────────────────────

    /// Insert or replace a user.
    pub fn upsert_user(&self, user: &User) -> Result<()> {
        let locations = serde_json::to_string(&user.locations)?;
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO users (id, username, channel_id, locations)
                 VALUES (?1, ?2, ?3, ?4)",
                params![user.id, user.username, user.channel_id, locations],
            )
            .map_err(db_err("Save user"))?;
        Ok(())
    }

    pub fn get_user(&self, user_id: &str) -> Result<User> {
        let row = self
            .conn()?
            .query_row(
                "SELECT id, username, channel_id, locations FROM users WHERE id = ?1",
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(db_err("Load user"))?;

        let (id, username, channel_id, locations) =
            row.ok_or_else(|| TripbellError::NotFound(format!("user {user_id}")))?;
        Ok(User {
            id,
            username,
            channel_id,
            locations: serde_json::from_str(&locations)?,
        })
    }

    /// Record a location in the user's recent history.
    pub fn add_location(&self, user_id: &str, location: Location) -> Result<()> {
        let mut user = self.get_user(user_id)?;
        user.add_location(location);
        self.upsert_user(&user)
    }

    // ─── Trips ────────────────────────────────────────────────

    /// Insert a new trip. Fails if the id already exists.
    pub fn add_trip(&self, trip: &Trip) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let itinerary = serde_json::to_string(&trip.expected_itinerary)?;
        let w = &trip.weekdays;
        self.conn()?
            .execute(
                &format!(
                    "INSERT INTO trips ({TRIP_COLUMNS}, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?18)"
                ),
                params![
                    trip.id,
                    trip.user_id,
                    trip.name,
                    trip.from_id,
                    trip.from,
                    trip.to_id,
                    trip.to,
                    trip.time,
                    trip.departure,
                    w.monday,
                    w.tuesday,
                    w.wednesday,
                    w.thursday,
                    w.friday,
                    w.saturday,
                    w.sunday,
                    itinerary,
                    now,
                ],
            )
            .map_err(db_err("Add trip"))?;
        tracing::debug!("💾 Trip added: '{}' ({})", trip.name, trip.id);
        Ok(())
    }

    /// Trips owned by one user, in creation order.
    pub fn list_user_trips(&self, user_id: &str) -> Result<Vec<Trip>> {
        self.query_trips(
            &format!("SELECT {TRIP_COLUMNS} FROM trips WHERE user_id = ?1 ORDER BY created_at"),
            params![user_id],
        )
    }

    /// Delete a user's trip. Returns whether a row was removed.
    pub fn delete_trip(&self, user_id: &str, trip_id: &str) -> Result<bool> {
        let removed = self
            .conn()?
            .execute(
                "DELETE FROM trips WHERE id = ?1 AND user_id = ?2",
                params![trip_id, user_id],
            )
            .map_err(db_err("Delete trip"))?;
        Ok(removed > 0)
    }

    fn query_trips(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<Trip>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).map_err(db_err("Prepare"))?;
        let rows = stmt
            .query_map(args, TripRow::from_row)
            .map_err(db_err("Load trips"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Load trips"))?;
        rows.into_iter().map(TripRow::into_trip).collect()
    }
}

#[async_trait]
impl TripStore for SqliteTripStore {
    async fn get_all_trips(&self) -> Result<Vec<Trip>> {
        self.query_trips(
            &format!("SELECT {TRIP_COLUMNS} FROM trips ORDER BY created_at"),
            [],
        )
    }

    async fn get_trip(&self, user_id: &str, trip_id: &str) -> Result<Trip> {
        self.query_trips(
            &format!("SELECT {TRIP_COLUMNS} FROM trips WHERE id = ?1 AND user_id = ?2"),
            params![trip_id, user_id],
        )?
        .into_iter()
        .next()
        .ok_or_else(|| TripbellError::NotFound(format!("trip {trip_id} of user {user_id}")))
    }

    async fn update_trip(&self, trip: &Trip) -> Result<()> {
        let itinerary = serde_json::to_string(&trip.expected_itinerary)?;
        let w = &trip.weekdays;
        let changed = self
            .conn()?
            .execute(
                "UPDATE trips SET name = ?3, from_id = ?4, from_name = ?5, to_id = ?6, to_name = ?7,
                    time = ?8, departure = ?9, monday = ?10, tuesday = ?11, wednesday = ?12,
                    thursday = ?13, friday = ?14, saturday = ?15, sunday = ?16, itinerary = ?17,
                    updated_at = ?18
                 WHERE id = ?1 AND user_id = ?2",
                params![
                    trip.id,
                    trip.user_id,
                    trip.name,
                    trip.from_id,
                    trip.from,
                    trip.to_id,
                    trip.to,
                    trip.time,
                    trip.departure,
                    w.monday,
                    w.tuesday,
                    w.wednesday,
                    w.thursday,
                    w.friday,
                    w.saturday,
                    w.sunday,
                    itinerary,
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(db_err("Update trip"))?;
        if changed == 0 {
            return Err(TripbellError::NotFound(format!("trip {}", trip.id)));
        }
        Ok(())
    }
}

/// Raw trip row before the itinerary JSON is decoded.
struct TripRow {
    trip: Trip,
    itinerary: String,
}

impl TripRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            trip: Trip {
                id: row.get(0)?,
                user_id: row.get(1)?,
                name: row.get(2)?,
                from_id: row.get(3)?,
                from: row.get(4)?,
                to_id: row.get(5)?,
                to: row.get(6)?,
                time: row.get(7)?,
                departure: row.get(8)?,
                weekdays: Weekdays {
                    monday: row.get(9)?,
                    tuesday: row.get(10)?,
                    wednesday: row.get(11)?,
                    thursday: row.get(12)?,
                    friday: row.get(13)?,
                    saturday: row.get(14)?,
                    sunday: row.get(15)?,
                },
                expected_itinerary: Itinerary::default(),
            },
            itinerary: row.get(16)?,
        })
    }

    fn into_trip(self) -> Result<Trip> {
        let mut trip = self.trip;
        trip.expected_itinerary = serde_json::from_str(&self.itinerary)?;
        Ok(trip)
    }
}
