use criterion::{criterion_group, criterion_main, Criterion};
use fsrepo_core::{CoreError, RecordSink, RecordSource, RepositoryCoordinator};
use fsrepo_schema::{ConfigError, ObjectTypeId, Record, RepositoryConfiguration};
use std::sync::Arc;

struct Documents(usize);

impl RecordSource for Documents {
    fn object_types(&self) -> Vec<ObjectTypeId> {
        vec![ObjectTypeId::new("cms.document")]
    }

    fn records(&self, object_type: &ObjectTypeId) -> Result<Vec<Record>, CoreError> {
        Ok((0..self.0)
            .map(|i| {
                Record::new(object_type.clone(), format!("Document {i}"))
                    .with_full_name(format!("/Site/Section {}/Document {i}", i % 7))
                    .with_field("index", i)
            })
            .collect())
    }
}

struct Discard;

impl RecordSink for Discard {
    fn apply(&self, _record: Record) -> Result<(), CoreError> {
        Ok(())
    }
}

fn coordinator(dir: &tempfile::TempDir, count: usize) -> RepositoryCoordinator {
    let config = RepositoryConfiguration::new(dir.path().join("repo"))
        .with_lock_dir(dir.path().join("locks"))
        .include("cms.document");
    RepositoryCoordinator::with_file_system(
        move || -> Result<RepositoryConfiguration, ConfigError> { Ok(config.clone()) },
        Arc::new(Documents(count)),
        Arc::new(Discard),
    )
    .unwrap()
}

fn bench_store_one(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = coordinator(&dir, 0);
    let record = Record::new("cms.document", "Article")
        .with_full_name("/News/2024/Article")
        .with_field("title", "Hello");
    c.bench_function("coordinator_store_one", |b| {
        b.iter(|| coordinator.store_one(&record).unwrap());
    });
}

fn bench_store_all(c: &mut Criterion) {
    c.bench_function("coordinator_store_all_100", |b| {
        b.iter_with_setup(
            || {
                let dir = tempfile::tempdir().unwrap();
                let coordinator = coordinator(&dir, 100);
                (dir, coordinator)
            },
            |(_dir, coordinator)| {
                assert!(coordinator.store_all(None, None).unwrap().success());
            },
        );
    });
}

fn bench_restore_all(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = coordinator(&dir, 100);
    coordinator.store_all(None, None).unwrap();
    c.bench_function("coordinator_restore_all_100", |b| {
        b.iter(|| coordinator.restore_all(None, None).unwrap());
    });
}

criterion_group!(benches, bench_store_one, bench_store_all, bench_restore_all);
criterion_main!(benches);
