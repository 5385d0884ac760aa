mod detail;
mod identifier;

pub use detail::DetailTable;
pub use identifier::IdentifierParser;

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::MissingDetailPolicy;
use crate::corpus::SimilarityIndex;
use crate::error::{NavigatorError, NavigatorResult};
use crate::generation::{Embedder, Judge};
use crate::pipeline::Stage;
use crate::semantic::normalize_whitespace;

#[derive(Debug, Clone, Serialize)]
pub struct RetrievedEntry {
    pub rank: usize,
    pub score: f64,
    pub chunk_id: String,
    pub document: String,
    pub identifier: Option<String>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalOutcome {
    pub query: String,
    pub k: usize,
    pub entries: Vec<RetrievedEntry>,
    pub skipped: Vec<String>,
    pub judged: bool,
    pub context: Vec<String>,
}

pub struct Retriever {
    index: SimilarityIndex,
    embedder: Arc<dyn Embedder>,
    details: DetailTable,
    identifiers: IdentifierParser,
    missing_detail: MissingDetailPolicy,
    judge: Option<Box<dyn Judge>>,
    judge_top_n: usize,
}

impl Retriever {
    pub fn new(
        index: SimilarityIndex,
        embedder: Arc<dyn Embedder>,
        details: DetailTable,
        identifiers: IdentifierParser,
        missing_detail: MissingDetailPolicy,
    ) -> Self {
        Self {
            index,
            embedder,
            details,
            identifiers,
            missing_detail,
            judge: None,
            judge_top_n: 3,
        }
    }

    pub fn with_judge(mut self, judge: Box<dyn Judge>, top_n: usize) -> Self {
        self.judge = Some(judge);
        self.judge_top_n = top_n.max(1);
        self
    }

    pub fn search(&self, query: &str, k: usize) -> NavigatorResult<Vec<String>> {
        Ok(self.search_detailed(query, k)?.context)
    }

    pub fn search_detailed(&self, query: &str, k: usize) -> NavigatorResult<RetrievalOutcome> {
        let query_embedding = self
            .embedder
            .embed(&normalize_whitespace(query))
            .map_err(NavigatorError::Embedding)?;
        let hits = self.index.nearest(&query_embedding, k);

        let mut entries = Vec::<RetrievedEntry>::with_capacity(hits.len());
        let mut expanded = Vec::<String>::with_capacity(hits.len());
        let mut skipped = Vec::<String>::new();

        for hit in hits {
            let identifier = self.identifiers.parse(&hit.text).map(str::to_string);
            let detail = identifier
                .as_deref()
                .and_then(|id| self.details.get(id))
                .map(str::to_string);

            match &detail {
                Some(record) => expanded.push(record.clone()),
                None => {
                    let missing = identifier
                        .clone()
                        .unwrap_or_else(|| format!("<untagged chunk {}>", hit.chunk_id));
                    if self.missing_detail == MissingDetailPolicy::Abort {
                        return Err(NavigatorError::RetrievalLookup {
                            identifier: missing,
                        });
                    }
                    warn!(
                        identifier = %missing,
                        chunk_id = %hit.chunk_id,
                        rank = hit.rank,
                        "no detail record for retrieved chunk, skipping"
                    );
                    skipped.push(missing);
                }
            }

            entries.push(RetrievedEntry {
                rank: hit.rank,
                score: hit.score,
                chunk_id: hit.chunk_id,
                document: hit.document,
                identifier,
                detail,
            });
        }

        let (context, judged) = match (&self.judge, expanded.is_empty()) {
            (Some(judge), false) => {
                debug!(candidates = expanded.len(), top_n = self.judge_top_n, "filtering retrieval with relevance judge");
                let selected = judge
                    .select(query, &expanded.join("\n"), self.judge_top_n)
                    .map_err(|err| NavigatorError::generation(Stage::Retrieve, err))?;
                (vec![selected], true)
            }
            _ => (expanded, false),
        };

        info!(
            k,
            hits = entries.len(),
            skipped = skipped.len(),
            judged,
            "retrieval completed"
        );

        Ok(RetrievalOutcome {
            query: query.to_string(),
            k,
            entries,
            skipped,
            judged,
            context,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::cell::RefCell;
    use std::path::Path;
    use std::rc::Rc;

    use super::*;
    use crate::config::DEFAULT_IDENTIFIER_PATTERN;
    use crate::corpus::{CorpusManifest, DocumentDescriptor, DocumentFormat};
    use crate::generation::{
        GenerationError, LocalHashEmbedder, RelevanceJudge, ScriptedGenerator,
    };

    fn build_index(dir: &Path, entries: &[&str]) -> (SimilarityIndex, Arc<dyn Embedder>) {
        let path = dir.join("capec-abstract.txt");
        let body = entries
            .iter()
            .map(|entry| format!("{entry};\n"))
            .collect::<String>();
        fs::write(&path, body).expect("write corpus");

        let embedder: Arc<dyn Embedder> = Arc::new(LocalHashEmbedder::new("test", 128));
        let manifest = CorpusManifest::new(vec![DocumentDescriptor::new(&path, DocumentFormat::Txt)]);
        let index = SimilarityIndex::build(&manifest, embedder.as_ref()).expect("index");
        (index, embedder)
    }

    fn parser() -> IdentifierParser {
        IdentifierParser::new(DEFAULT_IDENTIFIER_PATTERN).expect("pattern")
    }

    #[test]
    fn hit_is_replaced_by_its_detail_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (index, embedder) = build_index(dir.path(), &["[CAPEC-12]: Choosing message identifier"]);
        let details = DetailTable::from_entries([("12", "CAPEC-12 detail...")]);
        let retriever = Retriever::new(index, embedder, details, parser(), MissingDetailPolicy::Skip);

        let context = retriever.search("message identifier", 1).expect("search");
        assert_eq!(context, vec!["CAPEC-12 detail...".to_string()]);
    }

    #[test]
    fn expansion_follows_similarity_rank() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (index, embedder) = build_index(
            dir.path(),
            &[
                "[CAPEC-66]: SQL injection into database queries",
                "[CAPEC-651]: Eavesdropping on bluetooth wireless traffic",
                "[CAPEC-112]: Brute force password guessing",
            ],
        );
        let details = DetailTable::from_entries([
            ("66", "detail 66"),
            ("651", "detail 651"),
            ("112", "detail 112"),
        ]);
        let retriever = Retriever::new(index, embedder, details, parser(), MissingDetailPolicy::Skip);

        let outcome = retriever
            .search_detailed("eavesdropping on bluetooth wireless traffic", 3)
            .expect("search");
        assert_eq!(outcome.entries.len(), 3);
        assert_eq!(outcome.entries[0].identifier.as_deref(), Some("651"));
        assert_eq!(outcome.context[0], "detail 651");
        let ranks = outcome
            .entries
            .iter()
            .map(|entry| entry.rank)
            .collect::<Vec<usize>>();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn missing_identifier_is_skipped_by_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (index, embedder) = build_index(
            dir.path(),
            &["[CAPEC-1]: Known entry", "[CAPEC-2]: Unknown entry"],
        );
        let details = DetailTable::from_entries([("1", "detail 1")]);
        let retriever = Retriever::new(index, embedder, details, parser(), MissingDetailPolicy::Skip);

        let outcome = retriever.search_detailed("entry", 2).expect("search");
        assert_eq!(outcome.context, vec!["detail 1".to_string()]);
        assert_eq!(outcome.skipped, vec!["2".to_string()]);
    }

    #[test]
    fn missing_identifier_aborts_under_abort_policy() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (index, embedder) = build_index(dir.path(), &["[CAPEC-2]: Unknown entry"]);
        let retriever = Retriever::new(
            index,
            embedder,
            DetailTable::default(),
            parser(),
            MissingDetailPolicy::Abort,
        );

        let err = retriever.search("entry", 1).expect_err("lookup failure");
        match err {
            NavigatorError::RetrievalLookup { identifier } => assert_eq!(identifier, "2"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn judge_receives_joined_records_and_its_selection_is_returned() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (index, embedder) = build_index(
            dir.path(),
            &["[CAPEC-1]: first entry", "[CAPEC-2]: second entry"],
        );
        let details = DetailTable::from_entries([("1", "detail 1"), ("2", "detail 2")]);
        let retriever = Retriever::new(index, embedder, details, parser(), MissingDetailPolicy::Skip)
            .with_judge(
                Box::new(RelevanceJudge::new(ScriptedGenerator::new(vec!["detail 2"]))),
                1,
            );

        let outcome = retriever.search_detailed("second entry", 2).expect("search");
        assert!(outcome.judged);
        assert_eq!(outcome.context, vec!["detail 2".to_string()]);
        assert_eq!(outcome.entries.len(), 2);
    }

    struct RecordingJudge {
        calls: Rc<RefCell<Vec<(String, usize)>>>,
    }

    impl Judge for RecordingJudge {
        fn select(&self, query: &str, entries: &str, top_n: usize) -> Result<String, GenerationError> {
            self.calls.borrow_mut().push((query.to_string(), top_n));
            Ok(entries.lines().take(top_n).collect::<Vec<&str>>().join("\n"))
        }
    }

    #[test]
    fn judge_bound_is_independent_of_k_and_never_zero() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ids = ["1", "2", "3", "4", "5", "6"];
        let chunks = ids
            .iter()
            .map(|id| format!("[CAPEC-{id}]: wireless entry {id}"))
            .collect::<Vec<String>>();
        let chunk_refs = chunks.iter().map(String::as_str).collect::<Vec<&str>>();
        let (index, embedder) = build_index(dir.path(), &chunk_refs);
        let records = ids
            .iter()
            .map(|id| (*id, format!("detail {id}")))
            .collect::<Vec<(&str, String)>>();
        let details = DetailTable::from_entries(
            records.iter().map(|(id, record)| (*id, record.as_str())),
        );
        let calls = Rc::new(RefCell::new(Vec::new()));
        let retriever = Retriever::new(index, embedder, details, parser(), MissingDetailPolicy::Skip)
            .with_judge(
                Box::new(RecordingJudge {
                    calls: Rc::clone(&calls),
                }),
                0,
            );

        let outcome = retriever.search_detailed("wireless entry", 6).expect("search");

        assert_eq!(outcome.entries.len(), 6);
        assert!(outcome.judged);
        assert_eq!(outcome.context.len(), 1);
        assert!(!outcome.context[0].contains('\n'));
        assert_eq!(
            calls.borrow().as_slice(),
            &[("wireless entry".to_string(), 1)]
        );
    }

    #[test]
    fn judge_failure_is_a_retrieve_stage_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (index, embedder) = build_index(dir.path(), &["[CAPEC-1]: entry"]);
        let details = DetailTable::from_entries([("1", "detail 1")]);
        let retriever = Retriever::new(index, embedder, details, parser(), MissingDetailPolicy::Skip)
            .with_judge(
                Box::new(RelevanceJudge::new(ScriptedGenerator::failing(
                    GenerationError::Timeout(5),
                ))),
                3,
            );

        let err = retriever.search("entry", 1).expect_err("judge failure");
        assert!(matches!(
            err,
            NavigatorError::Generation {
                stage: Stage::Retrieve,
                ..
            }
        ));
    }
}
