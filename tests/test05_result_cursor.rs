use chrono::{NaiveDate, NaiveDateTime};
use futures_util::future::BoxFuture;
use sql_statement_pool::prelude::*;
use sql_statement_pool::test_utils::{Fault, MockProvider};

const PEOPLE: &str = "SELECT id, name, score, active, born, photo, nickname FROM people";

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn born() -> NaiveDate {
    NaiveDate::from_ymd_opt(1990, 4, 12).unwrap()
}

fn script_people(mock: &MockProvider) {
    mock.script_rows(
        PEOPLE,
        &["id", "name", "score", "active", "born", "photo", "nickname"],
        vec![
            vec![
                SqlValue::BigInt(1),
                SqlValue::Text("ann".into()),
                SqlValue::Double(4.5),
                SqlValue::Int(1),
                SqlValue::Date(born()),
                SqlValue::Blob(vec![0xde, 0xad]),
                SqlValue::Null(SqlType::Varchar),
            ],
            vec![
                SqlValue::BigInt(2),
                SqlValue::Text("bob".into()),
                SqlValue::Real(3.0),
                SqlValue::Bool(false),
                SqlValue::Text("1985-01-30 08:15:00".into()),
                SqlValue::Null(SqlType::Blob),
                SqlValue::Text("bobby".into()),
            ],
        ],
    );
}

fn read_people(rows: &mut ResultCursor, _: ()) -> BoxFuture<'_, Result<ResultSet, DbError>> {
    Box::pin(async move { rows.fetch_all().await })
}

#[tokio::test]
async fn typed_getters_follow_column_types() -> Result<(), DbError> {
    init_logging();
    let mock = MockProvider::start()?;
    script_people(&mock);
    let pool = StatementPool::new(mock.provider(), PEOPLE);

    let mut stmt = pool.acquire().await?;
    let mut rows = stmt.execute_query().await?;
    assert_eq!(
        rows.column_names()?,
        vec!["id", "name", "score", "active", "born", "photo", "nickname"]
    );

    assert!(rows.next().await?);
    assert_eq!(rows.get_i64(1)?, Some(1));
    assert_eq!(rows.get_i32(1)?, Some(1));
    assert_eq!(rows.get_string(2)?.as_deref(), Some("ann"));
    assert_eq!(rows.get_f64(3)?, Some(4.5));
    assert_eq!(rows.get_bool(4)?, Some(true));
    assert_eq!(rows.get_date(5)?, Some(born()));
    assert_eq!(rows.get_bytes(6)?, Some(vec![0xde, 0xad]));
    assert!(!rows.was_null());
    assert_eq!(rows.get_string(7)?, None);
    assert!(rows.was_null());

    assert!(rows.next().await?);
    assert_eq!(rows.get_f32(3)?, Some(3.0));
    assert_eq!(rows.get_bool(4)?, Some(false));
    let expected: Option<NaiveDateTime> =
        NaiveDate::from_ymd_opt(1985, 1, 30).and_then(|d| d.and_hms_opt(8, 15, 0));
    assert_eq!(rows.get_timestamp(5)?, expected);
    assert_eq!(rows.get_bytes(6)?, None);
    assert_eq!(rows.get_string(7)?.as_deref(), Some("bobby"));

    assert!(!rows.next().await?);
    rows.close().await?;
    rows.close().await?;
    assert!(rows.is_closed());
    stmt.close();
    mock.settle().await;
    assert!(mock.violations().is_empty());
    Ok(())
}

#[tokio::test]
async fn mismatched_getter_names_type_and_column() -> Result<(), DbError> {
    let mock = MockProvider::start()?;
    script_people(&mock);
    let pool = StatementPool::new(mock.provider(), PEOPLE);

    let mut stmt = pool.acquire().await?;
    let mut rows = stmt.execute_query().await?;
    assert!(rows.next().await?);

    let err = rows.get_i64(2).unwrap_err();
    assert_eq!(
        err.reason(),
        Some("Failed to get a long value from column 2 of the result set: column holds a string value")
    );
    let err = rows.get_i32(3).unwrap_err();
    assert!(
        err.reason()
            .unwrap()
            .starts_with("Failed to get an int value from column 3")
    );
    assert!(rows.get_string(42).is_err());
    rows.close().await?;
    Ok(())
}

#[tokio::test]
async fn cursor_step_failure_is_translated() -> Result<(), DbError> {
    let mock = MockProvider::start()?;
    script_people(&mock);
    let pool = StatementPool::new(mock.provider(), PEOPLE);

    let mut stmt = pool.acquire().await?;
    let mut rows = stmt.execute_query().await?;
    mock.fail_next(Fault::CursorNext);
    let err = rows.next().await.unwrap_err();
    assert!(
        err.reason()
            .unwrap()
            .starts_with("Failed to step to the next row of the result set")
    );
    rows.close().await?;
    Ok(())
}

#[tokio::test]
async fn result_set_is_addressable_by_column_name() -> Result<(), DbError> {
    let mock = MockProvider::start()?;
    script_people(&mock);
    let wrapper = StatementWrapper::new("[people]", mock.provider(), read_people);

    let set = wrapper.execute(PEOPLE, ()).await?;
    assert_eq!(set.len(), 2);
    assert_eq!(set.column_names().len(), 7);
    let bob = &set.results[1];
    assert_eq!(bob.get("name").and_then(SqlValue::as_text), Some("bob"));
    assert_eq!(bob.get("id").and_then(SqlValue::as_i64), Some(2));
    assert!(bob.get("photo").is_some_and(SqlValue::is_null));
    assert_eq!(bob.get_column_index("nickname"), Some(6));
    assert!(bob.get("missing").is_none());
    Ok(())
}

#[tokio::test]
async fn into_result_set_closes_the_cursor() -> Result<(), DbError> {
    let mock = MockProvider::start()?;
    let pool = StatementPool::new(mock.provider(), "SELECT ?, ?, ?");

    let mut stmt = pool.acquire().await?;
    stmt.set_i16(1, 7)?;
    stmt.set_null(2, SqlType::Date)?;
    stmt.set_f64(3, 0.25)?;
    let set = stmt.execute_query().await?.into_result_set().await?;
    assert_eq!(set.len(), 1);
    let row = &set.results[0];
    assert_eq!(row.get("p1"), Some(&SqlValue::SmallInt(7)));
    assert_eq!(row.get("p2"), Some(&SqlValue::Null(SqlType::Date)));
    assert_eq!(row.get_by_index(2), Some(&SqlValue::Double(0.25)));

    stmt.close();
    mock.settle().await;
    assert!(mock.violations().is_empty());
    Ok(())
}
