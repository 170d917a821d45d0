mod common;

use aliasdb_store::{
    AliasError, AliasQueryApi, AliasRange, AliasReplaceApi, AliasResult, AliasWriteApi,
    CreateAliasInput, ReplaceAliasInput,
};
use common::{DAY, count_rows, d, harness, target};

fn lost_race(err: &AliasError) -> bool {
    err.is_validation() || matches!(err, AliasError::Conflict { .. })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn conflicting_creates_never_both_commit() -> AliasResult<()> {
    let h = harness(d()).await?;
    for round in 0..8 {
        let alias = format!("race-{round}");
        let left = h.store.clone();
        let right = h.store.clone();
        let left_input = CreateAliasInput::open(alias.clone(), target("t1"), d());
        let right_input =
            CreateAliasInput::bounded(alias.clone(), target("t2"), d(), d().saturating_add(DAY));
        let (a, b) = tokio::join!(
            tokio::spawn(async move { left.create_alias(left_input).await }),
            tokio::spawn(async move { right.create_alias(right_input).await }),
        );
        let outcomes = [a.expect("join left"), b.expect("join right")];
        let committed = outcomes.iter().filter(|res| res.is_ok()).count();
        assert_eq!(committed, 1, "round {round}: {outcomes:?}");
        for res in &outcomes {
            if let Err(err) = res {
                assert!(lost_race(err), "round {round}: unexpected {err}");
            }
        }
        let bound = h.store.resolve_alias(&alias, d()).await?;
        assert!(bound.is_some(), "round {round}: alias left unbound");
    }
    assert_eq!(count_rows(&h.db).await?, 8);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_pair_creates_never_both_commit() -> AliasResult<()> {
    let h = harness(d()).await?;
    let mut handles = Vec::new();
    for _ in 0..6 {
        let store = h.store.clone();
        handles.push(tokio::spawn(async move {
            store
                .create_alias(CreateAliasInput::open("contended", target("t1"), d()))
                .await
        }));
    }
    let mut committed = 0;
    for handle in handles {
        match handle.await.expect("join") {
            Ok(_) => committed += 1,
            Err(err) => assert!(lost_race(&err), "unexpected {err}"),
        }
    }
    assert_eq!(committed, 1);
    let rows = h.store.get_aliases(&target("t1"), AliasRange::active()).await?;
    assert_eq!(rows.len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_replacements_close_the_record_once() -> AliasResult<()> {
    let h = harness(d()).await?;
    let record = h
        .store
        .create_alias(CreateAliasInput::open("origin", target("t1"), d().saturating_sub(DAY)))
        .await?;
    let mut handles = Vec::new();
    for n in 0..4 {
        let store = h.store.clone();
        let input = ReplaceAliasInput {
            record: record.clone(),
            replace_at: d(),
            new_alias: format!("successor-{n}"),
        };
        handles.push(tokio::spawn(async move { store.replace_alias(input).await }));
    }
    let mut committed = 0;
    for handle in handles {
        match handle.await.expect("join") {
            Ok(_) => committed += 1,
            Err(err) => assert!(lost_race(&err), "unexpected {err}"),
        }
    }
    assert_eq!(committed, 1);
    assert_eq!(count_rows(&h.db).await?, 2);
    let closed = h.store.get_alias(record.id).await?.expect("row");
    assert_eq!(closed.end, Some(d()));
    Ok(())
}
