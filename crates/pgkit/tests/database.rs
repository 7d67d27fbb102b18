//! Round trips against a live PostgreSQL.
//!
//! Set `DATABASE_URL` (a `postgres://` URL, read from `.env` as well) to run
//! these; without it every test returns early. `PGKIT_DSN` additionally runs
//! the `Db` tests with a `key=value` DSN.

use pgkit::{FromRow, KitError, KitResult, Param, QueryBuilder, RowExt, Scope};
use tokio_postgres::Row;

async fn try_connect() -> Option<tokio_postgres::Client> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").ok()?;
    let (client, connection) = tokio_postgres::connect(&database_url, tokio_postgres::NoTls)
        .await
        .expect("Failed to connect to DATABASE_URL with NoTls");
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            eprintln!("tokio-postgres connection error: {e}");
        }
    });
    Some(client)
}

/// Temp table visible only to `client`'s session.
async fn seed_income(client: &tokio_postgres::Client) {
    client
        .batch_execute(
            "CREATE TEMP TABLE income_per_billable (
                id BIGSERIAL PRIMARY KEY,
                date DATE NOT NULL,
                billable_type TEXT NOT NULL,
                doctor TEXT NOT NULL,
                total_amount BIGINT NOT NULL,
                cancelled_at TIMESTAMPTZ
            );
            INSERT INTO income_per_billable (date, billable_type, doctor, total_amount, cancelled_at) VALUES
                ('2023-01-10', 'Consultation', 'Dr. Smith', 100, NULL),
                ('2023-02-11', 'Consultation', 'Dr. Smith', 150, NULL),
                ('2023-03-12', 'Surgery',      'Dr. Smith', 900, NULL),
                ('2023-03-15', 'Consultation', 'Dr. Jones', 120, NULL),
                ('2024-01-05', 'Consultation', 'Dr. Jones', 130, NULL),
                ('2024-02-20', 'Surgery',      'Dr. Jones', 700, now());",
        )
        .await
        .unwrap();
}

#[derive(Debug, PartialEq)]
struct Income {
    doctor: String,
    billable_type: String,
    total_amount: i64,
}

impl FromRow for Income {
    fn from_row(row: &Row) -> KitResult<Self> {
        Ok(Self {
            doctor: row.try_get_column("doctor")?,
            billable_type: row.try_get_column("billable_type")?,
            total_amount: row.try_get_column("total_amount")?,
        })
    }
}

fn report(doctor: &'static str, category: &'static str, period: &'static str) -> QueryBuilder {
    let mut qb = QueryBuilder::new(
        "SELECT billable_type, doctor, SUM(total_amount)::BIGINT AS total_amount FROM income_per_billable",
    );
    qb.filter("doctor=?", doctor)
        .filter("billable_type=?", category)
        .filter("DATE_PART('year', date)::INT::TEXT=?", period)
        .group_by(["billable_type", "doctor"])
        .order_by(["total_amount DESC", "billable_type"]);
    qb
}

#[tokio::test]
async fn report_query_runs_with_and_without_filters() {
    let Some(client) = try_connect().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    seed_income(&client).await;

    let mut qb = QueryBuilder::new(
        "SELECT billable_type, doctor, SUM(total_amount)::BIGINT AS total_amount FROM income_per_billable",
    );
    qb.filter("doctor=?", "Dr. Smith")
        .filter("billable_type=?", "")
        .group_by(["billable_type", "doctor"])
        .order_by(["total_amount DESC"]);
    let rows: Vec<Income> = qb.fetch_all_as(&client).await.unwrap();
    assert_eq!(
        rows,
        vec![
            Income {
                doctor: "Dr. Smith".into(),
                billable_type: "Surgery".into(),
                total_amount: 900,
            },
            Income {
                doctor: "Dr. Smith".into(),
                billable_type: "Consultation".into(),
                total_amount: 250,
            },
        ]
    );

    let all: Vec<Income> = report("", "", "").fetch_all_as(&client).await.unwrap();
    assert_eq!(all.len(), 4);
}

#[tokio::test]
async fn year_filter_narrows_report() {
    let Some(client) = try_connect().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    seed_income(&client).await;

    let rows: Vec<Income> = report("Dr. Jones", "", "2024")
        .fetch_all_as(&client)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].total_amount, 700);
}

#[tokio::test]
async fn fetch_one_on_empty_result_is_not_found() {
    let Some(client) = try_connect().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };

    let mut qb = QueryBuilder::new("SELECT n FROM (VALUES (1)) AS t(n)");
    qb.filter("n::TEXT=?", "2");
    assert!(qb.fetch_one(&client).await.unwrap_err().is_not_found());
    assert!(qb.fetch_opt(&client).await.unwrap().is_none());
}

#[tokio::test]
async fn scope_filters_count_and_aggregate() {
    let Some(client) = try_connect().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    seed_income(&client).await;

    let scope = Scope::new("income_per_billable")
        .date_range("date", "2023-01-01", "2023-12-31")
        .ilike("doctor", "smi")
        .eq("billable_type", "")
        .is_null("cancelled_at", true);

    assert_eq!(scope.count(&client).await.unwrap(), 3);
    assert_eq!(scope.sum(&client, "total_amount").await.unwrap(), 1150);

    let none = scope.clone().in_list("billable_type", vec!["Dental".to_string()]);
    assert_eq!(none.sum(&client, "total_amount").await.unwrap(), 0);
    assert_eq!(none.avg(&client, "total_amount").await.unwrap(), 0.0);

    let months = Scope::new("income_per_billable").month_range("date", "2023-02-28", "2023-03-01");
    assert_eq!(months.count(&client).await.unwrap(), 1);

    let doctors = Scope::new("income_per_billable").distinct("doctor");
    assert_eq!(doctors.count(&client).await.unwrap(), 2);
}

#[tokio::test]
async fn scope_first_and_or_where() {
    let Some(client) = try_connect().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    seed_income(&client).await;

    let top: Income = Scope::new("income_per_billable")
        .select(["doctor", "billable_type", "total_amount"])
        .order("total_amount DESC")
        .first_as(&client)
        .await
        .unwrap();
    assert_eq!(top.total_amount, 900);

    let either = Scope::new("income_per_billable")
        .eq("billable_type", "Surgery")
        .or_where("total_amount < ?", [Param::new(110_i64)]);
    assert_eq!(either.count(&client).await.unwrap(), 3);

    let missing = Scope::new("income_per_billable").eq("doctor", "Dr. Who");
    assert!(missing.first(&client).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn scope_paginates() {
    let Some(client) = try_connect().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    seed_income(&client).await;

    let scope = Scope::new("income_per_billable")
        .select(["doctor", "billable_type", "total_amount"])
        .order("id");

    let page = scope.paginate::<Income>(&client, 2, 4).await.unwrap();
    assert_eq!(page.count, 6);
    assert_eq!(page.total_pages, 2);
    assert!(!page.has_next);
    assert!(page.has_prev);
    assert_eq!(page.results.len(), 2);
    assert_eq!(page.results[0].total_amount, 130);

    let first = scope.paginate::<Income>(&client, 0, 4).await.unwrap();
    assert_eq!(first.page, 1);
    assert!(first.has_next);
    assert_eq!(first.results.len(), 4);
}

#[tokio::test]
async fn scope_delete_requires_conditions() {
    let Some(client) = try_connect().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    seed_income(&client).await;

    let err = Scope::new("income_per_billable")
        .delete(&client)
        .await
        .unwrap_err();
    assert!(matches!(err, KitError::Validation(_)));

    let removed = Scope::new("income_per_billable")
        .is_null("cancelled_at", false)
        .delete(&client)
        .await
        .unwrap();
    assert_eq!(removed, 1);
}

#[tokio::test]
async fn db_connects_with_key_value_dsn() {
    use pgkit::{Db, LogConfig, PoolConfig};

    dotenvy::dotenv().ok();
    let Ok(dsn) = std::env::var("PGKIT_DSN") else {
        eprintln!("PGKIT_DSN not set; skipping");
        return;
    };

    let db = Db::connect(&dsn, LogConfig::default(), Some(PoolConfig::new().max_open_conns(4)))
        .await
        .unwrap();
    assert_eq!(db.pool().status().max_size, 4);

    let mut qb = QueryBuilder::new("SELECT n FROM generate_series(1, 5) AS t(n)");
    qb.filter("n > ?", 2_i32).order_by(["n"]);
    let rows: Vec<(i32,)> = qb.fetch_all_as(&db).await.unwrap();
    assert_eq!(rows, vec![(3,), (4,), (5,)]);

    let n = db
        .scope("generate_series(1, 10) AS t(n)")
        .in_range("n", Some(4_i32), Some(6_i32))
        .count(&db)
        .await
        .unwrap();
    assert_eq!(n, 3);

    pgkit::close(Some(db));
}

async fn try_pool(max_size: usize) -> Option<deadpool_postgres::Pool> {
    use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};

    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").ok()?;
    let config: tokio_postgres::Config = database_url
        .parse()
        .expect("DATABASE_URL is not a valid connection string");
    let mgr = Manager::from_config(
        config,
        tokio_postgres::NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );
    Some(Pool::builder(mgr).max_size(max_size).build().unwrap())
}

/// Open `n` connections at once, then hand them all back to the pool.
async fn checkout_and_release(pool: &deadpool_postgres::Pool, n: usize) {
    let mut held = Vec::with_capacity(n);
    for _ in 0..n {
        held.push(pool.get().await.unwrap());
    }
    drop(held);
    assert_eq!(pool.status().available, n);
}

#[tokio::test]
async fn prune_idle_applies_every_limit() {
    use pgkit::{PoolConfig, prune_idle};
    use std::time::Duration;

    let Some(pool) = try_pool(4).await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };

    checkout_and_release(&pool, 3).await;
    assert_eq!(prune_idle(&pool, &PoolConfig::new().max_idle_conns(1)), 2);
    assert_eq!(pool.status().size, 1);

    checkout_and_release(&pool, 3).await;
    let expired = PoolConfig::new().conn_max_lifetime(Duration::ZERO);
    assert_eq!(prune_idle(&pool, &expired), 3);
    assert_eq!(pool.status().size, 0);

    checkout_and_release(&pool, 2).await;
    let stale = PoolConfig::new().conn_max_idle_time(Duration::ZERO);
    assert_eq!(prune_idle(&pool, &stale), 2);
    assert_eq!(pool.status().size, 0);

    assert_eq!(prune_idle(&pool, &PoolConfig::default()), 0);
}
