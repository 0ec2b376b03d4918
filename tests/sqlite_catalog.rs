use std::sync::Arc;

use anyhow::Result;
use tempfile::tempdir;

use school_import::config::Config;
use school_import::domain::{BatchStatus, DataType, FinancialTransaction, Student};
use school_import::pipeline::{ApplierRegistry, ReviewOrchestrator};
use school_import::storage::{Repository, SqliteCatalog};

fn orchestrator(catalog: &SqliteCatalog, config: &Config) -> ReviewOrchestrator {
    ReviewOrchestrator::new(
        Arc::new(catalog.batch_store()),
        Arc::new(ApplierRegistry::with_collections(&catalog.collections())),
        config.review_options(),
    )
}

#[tokio::test]
async fn test_import_survives_reopen() -> Result<()> {
    let temp_dir = tempdir()?;
    let config = Config::from_toml_str(&format!(
        "[storage]\ndata_root = {:?}\n",
        temp_dir.path().display().to_string()
    ))?;

    let batch_id = {
        let catalog = SqliteCatalog::open_at_root(&config.storage.data_root)?;
        let review = orchestrator(&catalog, &config);
        let batch = review
            .submit(
                DataType::FinancialTransactions,
                "paiements.csv",
                "\u{feff}id,date,description,studentName,type,amount,status\r\n\
                 tx1,2024-10-01,Scolarité octobre,Awa Diallo,income,25000,paid\r\n\
                 tx2,2024-10-02,Cantine,Moussa Ndiaye,income\r\n",
                "comptable",
            )
            .await?;
        let outcome = review.approve(&batch.id, "econome").await?;
        assert_eq!(outcome.stats.created, 1);
        assert_eq!(outcome.batch.skipped_lines, vec![3]);
        batch.id
    };

    let catalog = SqliteCatalog::open_at_root(&config.storage.data_root)?;
    let review = orchestrator(&catalog, &config);

    let stored = review.get(&batch_id).await?.expect("batch persisted");
    assert_eq!(stored.status, BatchStatus::Applied);
    assert_eq!(stored.reviewed_by.as_deref(), Some("econome"));
    assert_eq!(stored.skipped_lines, vec![3]);
    assert!(stored.content_intact());

    let tx: FinancialTransaction = catalog
        .repository::<FinancialTransaction>()
        .find_by_key(&"tx1".to_string())
        .await?
        .expect("transaction persisted");
    assert_eq!(tx.amount, 25000.0);
    assert_eq!(tx.student_name, "Awa Diallo");
    Ok(())
}

#[tokio::test]
async fn test_sqlite_merge_preserves_documents() -> Result<()> {
    let catalog = SqliteCatalog::open_in_memory()?;
    let config = Config::default();
    let review = orchestrator(&catalog, &config);

    let first = review
        .submit(
            DataType::StudentList,
            "eleves.csv",
            "id,lastName,firstName,phone\ns1,Diallo,Awa,770000000",
            "secretariat",
        )
        .await?;
    review.approve(&first.id, "directrice").await?;

    let students = catalog.repository::<Student>();
    let mut student = students.find_by_key(&"s1".to_string()).await?.unwrap();
    student.documents.push(Default::default());
    students.upsert(student).await?;

    let second = review
        .submit(
            DataType::StudentList,
            "eleves-maj.csv",
            "id,lastName\ns1,Diallo-Ba",
            "secretariat",
        )
        .await?;
    let outcome = review.approve(&second.id, "directrice").await?;
    assert_eq!(outcome.stats.updated, 1);

    let merged = students.find_by_key(&"s1".to_string()).await?.unwrap();
    assert_eq!(merged.last_name, "Diallo-Ba");
    assert_eq!(merged.phone, "770000000");
    assert_eq!(merged.documents.len(), 1);

    let listed = review.list().await?;
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, second.id);
    Ok(())
}
