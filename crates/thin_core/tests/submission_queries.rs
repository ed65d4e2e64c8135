use rusqlite::Connection;
use thin_core::db::open_db_in_memory;
use thin_core::record::insert;
use thin_core::repo::submission_repo::SAMPLE_LIMIT;
use thin_core::{
    for_form_id, AgeCount, Persistable, RepoError, SqliteSubmissionRepository, Submission,
    SubmissionFields, SubmissionRepository,
};

fn seed(conn: &mut Connection, form_id: &str, instance_id: &str, fields: &str) -> i64 {
    let raw = format!(r#"<data id="{form_id}" instanceID="{instance_id}">{fields}</data>"#);
    let mut submission = Submission::from_payload(raw);
    insert(conn, &mut submission).unwrap()
}

fn instance_ids(submissions: &[Submission]) -> Vec<String> {
    let mut ids: Vec<String> = submissions
        .iter()
        .filter_map(|submission| submission.instance_id().map(str::to_string))
        .collect();
    ids.sort();
    ids
}

#[test]
fn cursor_yields_every_submission_of_one_form() {
    let mut conn = open_db_in_memory().unwrap();
    for n in 1..=3 {
        seed(&mut conn, "weights", &format!("uuid:{n}"), "<age>1</age>");
    }
    seed(&mut conn, "heights", "uuid:9", "<age>1</age>");

    let mut cursor = for_form_id(&conn, "weights").unwrap();
    let submissions: Vec<Submission> = cursor
        .iter()
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    cursor.close().unwrap();

    assert_eq!(instance_ids(&submissions), ["uuid:1", "uuid:2", "uuid:3"]);
    assert!(submissions.iter().all(|submission| submission.id().is_some()));
}

#[test]
fn cursor_can_stop_early_and_be_reiterated() {
    let mut conn = open_db_in_memory().unwrap();
    for n in 1..=5 {
        seed(&mut conn, "weights", &format!("uuid:{n}"), "");
    }

    let mut cursor = for_form_id(&conn, "weights").unwrap();
    let first = cursor.iter().unwrap().next().unwrap().unwrap();
    assert_eq!(first.form_id(), Some("weights"));

    assert_eq!(cursor.iter().unwrap().count(), 5);
    cursor.close().unwrap();
}

#[test]
fn cursor_over_unknown_form_is_empty() {
    let conn = open_db_in_memory().unwrap();
    let mut cursor = for_form_id(&conn, "nothing").unwrap();
    assert_eq!(cursor.iter().unwrap().count(), 0);
}

#[test]
fn sample_returns_only_matching_form() {
    let mut conn = open_db_in_memory().unwrap();
    seed(&mut conn, "weights", "uuid:1", "");
    seed(&mut conn, "weights", "uuid:2", "");
    seed(&mut conn, "heights", "uuid:3", "");

    let repo = SqliteSubmissionRepository::new(&conn);
    let sample = repo.sample_for_form_id("weights").unwrap();
    assert_eq!(instance_ids(&sample), ["uuid:1", "uuid:2"]);
    assert!(repo.sample_for_form_id("missing").unwrap().is_empty());
}

#[test]
fn sample_is_capped() {
    let mut conn = open_db_in_memory().unwrap();
    let tx = conn.transaction().unwrap();
    for n in 0..1005 {
        tx.execute(
            "INSERT INTO submissions (formId, instanceId, data) VALUES ('bulk', ?1, '<data/>');",
            [format!("uuid:{n}")],
        )
        .unwrap();
    }
    tx.commit().unwrap();

    let repo = SqliteSubmissionRepository::new(&conn);
    assert_eq!(
        repo.sample_for_form_id("bulk").unwrap().len() as i64,
        SAMPLE_LIMIT
    );
}

#[test]
fn find_by_form_and_instance_returns_match_or_none() {
    let mut conn = open_db_in_memory().unwrap();
    let id = seed(&mut conn, "weights", "uuid:1", "<age>5</age>");

    let repo = SqliteSubmissionRepository::new(&conn);
    let found = repo
        .find_by_form_and_instance("weights", "uuid:1")
        .unwrap()
        .expect("submission should exist");
    assert_eq!(found.id(), Some(id));

    assert!(repo
        .find_by_form_and_instance("weights", "uuid:2")
        .unwrap()
        .is_none());
    assert!(repo
        .find_by_form_and_instance("heights", "uuid:1")
        .unwrap()
        .is_none());
}

#[test]
fn page_of_fields_rejects_invalid_input() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteSubmissionRepository::new(&conn);

    for (sort, per_page, page) in [
        (None, -1, 1),
        (None, 10, 0),
        (Some("not_a_real_field"), 10, 1),
        (Some("data; DROP TABLE submissions"), 10, 1),
    ] {
        let err = repo
            .page_of_fields("weights", sort, per_page, page)
            .unwrap_err();
        assert!(matches!(err, RepoError::InvalidArgument(_)), "{err}");
    }

    assert!(repo
        .page_of_fields("weights", None, 0, 1)
        .unwrap()
        .is_empty());
}

#[test]
fn page_of_fields_sorts_and_paginates() {
    let mut conn = open_db_in_memory().unwrap();
    let first = seed(
        &mut conn,
        "weights",
        "uuid:1",
        "<age>9</age><kilograms>30</kilograms><year>2015</year>",
    );
    let second = seed(
        &mut conn,
        "weights",
        "uuid:2",
        "<age>3</age><kilograms>14</kilograms><year>2017</year>",
    );
    let third = seed(&mut conn, "weights", "uuid:3", "<age>6</age>");
    seed(&mut conn, "heights", "uuid:4", "<age>1</age>");

    let repo = SqliteSubmissionRepository::new(&conn);

    let by_id = repo.page_of_fields("weights", None, 10, 1).unwrap();
    assert_eq!(
        by_id.iter().map(|fields| fields.id).collect::<Vec<_>>(),
        [first, second, third]
    );
    assert_eq!(
        by_id[1],
        SubmissionFields {
            id: second,
            age: Some(3),
            kilograms: Some(14),
            year: Some(2017),
        }
    );
    assert_eq!(by_id[2].kilograms, None);

    let by_age = repo.page_of_fields("weights", Some("age"), 2, 1).unwrap();
    assert_eq!(
        by_age.iter().map(|fields| fields.age).collect::<Vec<_>>(),
        [Some(3), Some(6)]
    );

    let second_page = repo.page_of_fields("weights", Some("age"), 2, 2).unwrap();
    assert_eq!(second_page.len(), 1);
    assert_eq!(second_page[0].age, Some(9));

    assert!(repo
        .page_of_fields("weights", Some("year"), 2, 3)
        .unwrap()
        .is_empty());
}

#[test]
fn page_of_fields_sorts_missing_values_last() {
    let mut conn = open_db_in_memory().unwrap();
    let without_age = seed(&mut conn, "weights", "uuid:1", "<name>no age</name>");
    let older = seed(&mut conn, "weights", "uuid:2", "<age>8</age>");
    let younger = seed(&mut conn, "weights", "uuid:3", "<age>2</age>");

    let repo = SqliteSubmissionRepository::new(&conn);
    let by_age = repo.page_of_fields("weights", Some("age"), 10, 1).unwrap();
    assert_eq!(
        by_age.iter().map(|fields| fields.id).collect::<Vec<_>>(),
        [younger, older, without_age]
    );
    assert_eq!(by_age[2].age, None);
}

#[test]
fn counts_by_age_groups_submissions() {
    let mut conn = open_db_in_memory().unwrap();
    seed(&mut conn, "weights", "uuid:1", "<age>5</age>");
    seed(&mut conn, "weights", "uuid:2", "<age>7</age>");
    seed(&mut conn, "weights", "uuid:3", "<age>5</age>");
    seed(&mut conn, "weights", "uuid:4", "<name>no age</name>");
    seed(&mut conn, "heights", "uuid:5", "<age>5</age>");

    let repo = SqliteSubmissionRepository::new(&conn);
    assert_eq!(
        repo.counts_by_age("weights").unwrap(),
        [
            AgeCount {
                age: None,
                count: 1
            },
            AgeCount {
                age: Some(5),
                count: 2
            },
            AgeCount {
                age: Some(7),
                count: 1
            },
        ]
    );
}
