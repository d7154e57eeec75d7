use roster_core::db::open_db_in_memory;
use roster_core::query::{FinderTable, PlanOrigin};
use roster_core::{
    Arg, AuditInterceptor, CrudRepository, FinderDeclaration, FixedActor, Member,
    MemberRepository, NamedQueryRegistry, PageRequest, QueryDerivationError, RepoError,
    ResultShape, Sort, SqliteEntityStore,
};
use std::sync::Arc;

fn audit() -> Arc<AuditInterceptor> {
    Arc::new(AuditInterceptor::with_actor(FixedActor::new("tester")))
}

fn seed(store: &SqliteEntityStore<'_, Member>, ages: &[i32]) {
    for (index, age) in ages.iter().enumerate() {
        store
            .insert(Member::new(format!("member{index}"), *age))
            .expect("insert should succeed");
    }
}

fn compile_one(
    conn: &rusqlite::Connection,
    registry: &NamedQueryRegistry,
    declaration: FinderDeclaration,
) -> Result<FinderTable, QueryDerivationError> {
    FinderTable::compile::<Member>(conn, registry, &[declaration])
}

#[test]
fn unsupported_unknown_and_unrecognized_methods_fail_at_compile_time() {
    let conn = open_db_in_memory().expect("open db");
    let registry = NamedQueryRegistry::default();

    let err = compile_one(
        &conn,
        &registry,
        FinderDeclaration::derived("find_by_username_ignore_case", ResultShape::List)
            .param("username"),
    )
    .unwrap_err();
    assert!(matches!(err, QueryDerivationError::UnsupportedOperator { .. }));

    let err = compile_one(
        &conn,
        &registry,
        FinderDeclaration::derived("find_by_username_or_age", ResultShape::List)
            .param("username")
            .param("age"),
    )
    .unwrap_err();
    assert!(matches!(err, QueryDerivationError::UnsupportedOperator { .. }));

    let err = compile_one(
        &conn,
        &registry,
        FinderDeclaration::derived("find_by_nickname", ResultShape::List).param("nickname"),
    )
    .unwrap_err();
    assert!(matches!(err, QueryDerivationError::UnknownProperty { .. }));

    let err = compile_one(
        &conn,
        &registry,
        FinderDeclaration::derived("fetch_everything", ResultShape::List),
    )
    .unwrap_err();
    assert!(matches!(err, QueryDerivationError::UnrecognizedMethod { .. }));
}

#[test]
fn derived_operators_translate_to_filters() {
    let conn = open_db_in_memory().expect("open db");
    let store = SqliteEntityStore::<Member>::try_new(&conn, audit()).expect("migrated schema");
    seed(&store, &[10, 20, 30, 40]);
    let registry = NamedQueryRegistry::default();

    let table = FinderTable::compile::<Member>(
        &conn,
        &registry,
        &[
            FinderDeclaration::derived("find_by_age_between_order_by_age_desc", ResultShape::List)
                .param("low")
                .param("high"),
            FinderDeclaration::derived("find_by_age_not_in", ResultShape::List)
                .sequence_param("ages"),
            FinderDeclaration::derived("find_by_username_ending_with", ResultShape::List)
                .param("suffix"),
            FinderDeclaration::derived("count_by_team_id_is_null", ResultShape::Count),
        ],
    )
    .expect("finder should compile");

    let between = table
        .plan("find_by_age_between_order_by_age_desc")
        .expect("finder should be registered")
        .fetch_list(&store, &[Arg::scalar(15), Arg::scalar(35)])
        .expect("fetch list should succeed");
    let ages: Vec<i32> = between.iter().map(|member| member.age).collect();
    assert_eq!(ages, vec![30, 20]);

    let not_in = table
        .plan("find_by_age_not_in")
        .expect("finder should be registered")
        .fetch_list(&store, &[Arg::sequence([10, 20])])
        .expect("fetch list should succeed");
    assert_eq!(not_in.len(), 2);

    let ending = table
        .plan("find_by_username_ending_with")
        .expect("finder should be registered")
        .fetch_list(&store, &[Arg::text("3")])
        .expect("fetch list should succeed");
    assert_eq!(ending.len(), 1);
    assert_eq!(ending[0].username, "member3");

    let teamless = table
        .plan("count_by_team_id_is_null")
        .expect("finder should be registered")
        .fetch_count(&store, &[])
        .expect("fetch count should succeed");
    assert_eq!(teamless, 4);
}

#[test]
fn text_page_uses_declared_count_query() {
    let conn = open_db_in_memory().expect("open db");
    let store = SqliteEntityStore::<Member>::try_new(&conn, audit()).expect("migrated schema");
    seed(&store, &[10, 20, 30, 40, 50]);

    let table = compile_one(
        &conn,
        &NamedQueryRegistry::default(),
        FinderDeclaration::text(
            "find_adults",
            "SELECT * FROM member WHERE age >= :age",
            ResultShape::Page,
        )
        .with_count_query("SELECT COUNT(*) FROM member WHERE age >= :age")
        .param("age"),
    )
    .expect("compile one should succeed");

    let page = table
        .plan("find_adults")
        .expect("finder should be registered")
        .fetch_page(
            &store,
            &[Arg::scalar(20)],
            &PageRequest::new(0, 2, Sort::desc("age")).expect("valid page request"),
        )
        .expect("fetch page should succeed");
    let ages: Vec<i32> = page.content().iter().map(|member| member.age).collect();
    assert_eq!(ages, vec![50, 40]);
    assert_eq!(page.total_elements(), 4);
    assert_eq!(page.total_pages(), 2);
}

#[test]
fn registered_count_query_backs_paged_named_finder() {
    let conn = open_db_in_memory().expect("open db");
    let store = SqliteEntityStore::<Member>::try_new(&conn, audit()).expect("migrated schema");
    seed(&store, &[10, 20, 30]);
    let registry = NamedQueryRegistry::builder()
        .register_with_count(
            "Member.findOlderThan",
            "SELECT * FROM member WHERE age > :age",
            "SELECT COUNT(*) FROM member WHERE age > :age",
        )
        .expect("valid named query")
        .build();

    let table = compile_one(
        &conn,
        &registry,
        FinderDeclaration::derived("find_older_than", ResultShape::Page).param("age"),
    )
    .expect("compile one should succeed");
    let plan = table.plan("find_older_than").expect("finder should be registered");
    assert_eq!(plan.origin(), &PlanOrigin::Named("Member.findOlderThan".to_string()));

    let page = plan
        .fetch_page(
            &store,
            &[Arg::scalar(15)],
            &PageRequest::new(0, 1, Sort::asc("age")).expect("valid page request"),
        )
        .expect("fetch page should succeed");
    assert_eq!(page.content()[0].age, 20);
    assert_eq!(page.total_elements(), 2);
}

#[test]
fn named_page_without_count_query_fails_fast() {
    let conn = open_db_in_memory().expect("open db");
    let registry = NamedQueryRegistry::builder()
        .register("Member.findAll", "SELECT * FROM member")
        .expect("valid named query")
        .build();

    let err = compile_one(
        &conn,
        &registry,
        FinderDeclaration::named("find_all", ResultShape::Page),
    )
    .unwrap_err();
    assert!(matches!(err, QueryDerivationError::MissingCountQuery { .. }));
}

#[test]
fn calls_with_wrong_shape_or_arguments_are_invalid() {
    let conn = open_db_in_memory().expect("open db");
    let repo = MemberRepository::try_new(&conn, audit()).expect("migrated schema");
    let plan = repo.finders().plan("find_by_username").expect("finder should be registered");

    assert!(matches!(
        plan.fetch_count(repo.store(), &[Arg::text("joy")]),
        Err(RepoError::InvalidArgument(_))
    ));
    assert!(matches!(
        plan.fetch_list(repo.store(), &[]),
        Err(RepoError::InvalidArgument(_))
    ));
    assert!(matches!(
        plan.fetch_list(repo.store(), &[Arg::texts(&["joy"])]),
        Err(RepoError::InvalidArgument(_))
    ));
    assert!(repo.finders().plan("find_by_nickname").is_err());
}

#[test]
fn verification_rejects_text_that_does_not_match_the_schema() {
    let conn = open_db_in_memory().expect("open db");
    let err = compile_one(
        &conn,
        &NamedQueryRegistry::default(),
        FinderDeclaration::text(
            "find_by_nickname",
            "SELECT * FROM member WHERE nickname = :nickname",
            ResultShape::List,
        )
        .param("nickname"),
    )
    .unwrap_err();
    assert!(matches!(err, QueryDerivationError::Verification { .. }));
}
