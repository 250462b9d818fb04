use alvara_retrieval::{
    normalize_query, LawCategory, MatchMode, MemoryCorpus, NewRegulation, Regulation,
    RegulationCorpus, RetrievalClient, RetrievalError, RetrievalResult, RetrievedExcerpt,
};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Corpus answering the first `busy` searches with a given status
struct BusyCorpus {
    inner: Arc<MemoryCorpus>,
    busy: AtomicU32,
    status: u16,
}

impl BusyCorpus {
    fn new(inner: Arc<MemoryCorpus>, busy: u32, status: u16) -> Self {
        Self {
            inner,
            busy: AtomicU32::new(busy),
            status,
        }
    }
}

#[async_trait::async_trait]
impl RegulationCorpus for BusyCorpus {
    async fn search(
        &self,
        terms: &[String],
        mode: MatchMode,
        limit: usize,
    ) -> RetrievalResult<Vec<RetrievedExcerpt>> {
        let left = self.busy.load(Ordering::SeqCst);
        if left > 0 {
            self.busy.store(left - 1, Ordering::SeqCst);
            return Err(RetrievalError::status_error(self.status, "busy"));
        }
        self.inner.search(terms, mode, limit).await
    }

    async fn list(&self) -> RetrievalResult<Vec<Regulation>> {
        self.inner.list().await
    }

    async fn insert(&self, regulation: NewRegulation) -> RetrievalResult<Regulation> {
        self.inner.insert(regulation).await
    }

    async fn delete(&self, id: &str) -> RetrievalResult<()> {
        self.inner.delete(id).await
    }
}

async fn seeded() -> Arc<MemoryCorpus> {
    let corpus = Arc::new(MemoryCorpus::new());
    corpus
        .insert(
            NewRegulation::new("Código de Obras", LawCategory::CodigoObras)
                .with_text("Artigo 120. O prisma de ventilação terá área mínima de 4,00m²."),
        )
        .await
        .unwrap();
    corpus
        .insert(
            NewRegulation::new("Plano Diretor", LawCategory::PlanoDiretor)
                .with_text("Artigo 87. O loteamento observará recuo frontal de 5,00m."),
        )
        .await
        .unwrap();
    corpus
}

#[tokio::test]
async fn exact_hit_issues_single_search() {
    let corpus = seeded().await;
    let client = RetrievalClient::new(corpus.clone());

    let hits = client
        .retrieve(&normalize_query("qual artigo fala do prisma de ventilação"))
        .await
        .unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].title, "Código de Obras");
    assert_eq!(corpus.searches().len(), 1);
    assert_eq!(corpus.searches()[0].mode, MatchMode::All);
}

#[tokio::test]
async fn empty_and_search_broadens_exactly_once() {
    let corpus = seeded().await;
    let client = RetrievalClient::new(corpus.clone());

    let hits = client.retrieve("prisma garagem").await.unwrap();
    assert_eq!(hits.len(), 1);

    let modes: Vec<_> = corpus.searches().iter().map(|s| s.mode).collect();
    assert_eq!(modes, vec![MatchMode::All, MatchMode::Any]);
}

#[tokio::test]
async fn no_match_after_both_tiers_is_empty_ok() {
    let corpus = seeded().await;
    let client = RetrievalClient::new(corpus.clone());

    let hits = client.retrieve("piscina aquecida").await.unwrap();
    assert!(hits.is_empty());

    let searches = corpus.searches();
    assert_eq!(searches.len(), 2);
    assert_eq!(searches[0].terms, searches[1].terms);
}

#[tokio::test]
async fn empty_query_issues_no_search() {
    let corpus = seeded().await;
    let client = RetrievalClient::new(corpus.clone());
    assert!(client.retrieve("   ").await.unwrap().is_empty());
    assert!(corpus.searches().is_empty());
}

#[tokio::test]
async fn limit_caps_results() {
    let corpus = seeded().await;
    let client = RetrievalClient::new(corpus.clone()).with_limit(1);
    let hits = client.retrieve("artigo").await.unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn catalog_is_cached_until_a_write() {
    let corpus = seeded().await;
    let client = RetrievalClient::new(corpus.clone());

    assert_eq!(client.list_laws().await.unwrap().len(), 2);
    assert_eq!(client.list_laws().await.unwrap().len(), 2);
    assert_eq!(corpus.list_calls(), 1);

    let added = client
        .add_law(NewRegulation::new("Lei Ambiental", LawCategory::Ambiental))
        .await
        .unwrap();
    assert_eq!(client.list_laws().await.unwrap().len(), 3);
    assert_eq!(corpus.list_calls(), 2);

    client.delete_law(&added.id).await.unwrap();
    assert_eq!(client.list_laws().await.unwrap().len(), 2);
    assert_eq!(corpus.list_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn quota_errors_on_search_are_retried() {
    let corpus = seeded().await;
    let client = RetrievalClient::new(Arc::new(BusyCorpus::new(corpus.clone(), 2, 429)));

    let start = Instant::now();
    let hits = client.retrieve("prisma ventilação").await.unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(start.elapsed(), Duration::from_millis(6000));
    let modes: Vec<_> = corpus.searches().iter().map(|s| s.mode).collect();
    assert_eq!(modes, vec![MatchMode::All]);
}

#[tokio::test(start_paused = true)]
async fn final_search_errors_are_not_retried() {
    let corpus = seeded().await;
    let client = RetrievalClient::new(Arc::new(BusyCorpus::new(corpus.clone(), 1, 400)));

    let err = client.retrieve("prisma ventilação").await.unwrap_err();

    assert!(matches!(err, RetrievalError::Status { status: 400, .. }));
    assert!(corpus.searches().is_empty());
}
