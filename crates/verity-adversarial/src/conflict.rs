//! Evidence conflict detection between agents' arguments

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use verity_core::{AgentType, Argument, Evidence, EvidenceRef, Position};

use crate::resolution::ResolutionStrategy;

/// Kind of contradiction found between agents' evidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictType {
    /// Same source (or same source category/domain) saying contradictory things
    SourceDisagreement,
    /// Contradictory evidence published in the same quarter
    TemporalDiscrepancy,
    /// Opposing sides relying on disjoint methodologies
    MethodologyDifference,
    /// Identical evidence read in opposite directions
    InterpretationVariance,
}

impl ConflictType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SourceDisagreement => "source_disagreement",
            Self::TemporalDiscrepancy => "temporal_discrepancy",
            Self::MethodologyDifference => "methodology_difference",
            Self::InterpretationVariance => "interpretation_variance",
        }
    }

    /// Resolution strategy applied to this kind of conflict
    pub fn strategy(&self) -> ResolutionStrategy {
        match self {
            Self::SourceDisagreement => ResolutionStrategy::CredibilityWeighted,
            Self::TemporalDiscrepancy => ResolutionStrategy::TemporalPriority,
            Self::MethodologyDifference => ResolutionStrategy::MethodologyRanking,
            Self::InterpretationVariance => ResolutionStrategy::InterpretationMerge,
        }
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contradiction between evidence cited by different agents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceConflict {
    /// Deterministic id derived from the type and the evidence involved
    pub id: String,
    pub conflict_type: ConflictType,
    pub agents: Vec<AgentType>,
    pub evidence: Vec<EvidenceRef>,
    pub strategy: ResolutionStrategy,
    pub resolved: bool,
    pub description: String,
}

impl EvidenceConflict {
    pub fn new(
        conflict_type: ConflictType,
        agents: impl IntoIterator<Item = AgentType>,
        evidence: Vec<EvidenceRef>,
        description: String,
    ) -> Self {
        let agents: Vec<AgentType> = agents.into_iter().collect::<BTreeSet<_>>().into_iter().collect();

        let mut fingerprints: Vec<String> = evidence.iter().map(|e| e.fingerprint()).collect();
        fingerprints.sort();
        let mut hasher = Sha256::new();
        hasher.update(conflict_type.as_str().as_bytes());
        for fp in &fingerprints {
            hasher.update(fp.as_bytes());
        }
        let digest = hex::encode(hasher.finalize());

        Self {
            id: format!("conflict-{}", &digest[..16]),
            conflict_type,
            agents,
            evidence,
            strategy: conflict_type.strategy(),
            resolved: false,
            description,
        }
    }
}

/// Methodology family an evidence item appears to rely on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodologyGroup {
    Research,
    Survey,
    Statistical,
    ExpertOpinion,
    Investigative,
    General,
}

impl MethodologyGroup {
    const KEYWORDS: [(MethodologyGroup, &'static [&'static str]); 5] = [
        (
            MethodologyGroup::Research,
            &["study", "studies", "research", "peer", "trial", "experiment", "journal", "meta"],
        ),
        (
            MethodologyGroup::Survey,
            &["survey", "poll", "polling", "questionnaire", "respondents"],
        ),
        (
            MethodologyGroup::Statistical,
            &["statistics", "statistical", "data", "census", "regression", "dataset"],
        ),
        (
            MethodologyGroup::ExpertOpinion,
            &["expert", "experts", "professor", "analyst", "opinion", "specialist"],
        ),
        (
            MethodologyGroup::Investigative,
            &["investigation", "investigative", "documents", "leaked", "interview", "whistleblower"],
        ),
    ];

    /// First keyword group found in the text, in priority order
    pub fn detect(content: &str) -> Self {
        let words = tokens(content);
        Self::KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| words.contains(*k)))
            .map(|(group, _)| *group)
            .unwrap_or(MethodologyGroup::General)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Survey => "survey",
            Self::Statistical => "statistical",
            Self::ExpertOpinion => "expert-opinion",
            Self::Investigative => "investigative",
            Self::General => "general",
        }
    }
}

/// Word pairs whose co-occurrence across two texts marks a contradiction
const CONTRADICTIONS: &[(&str, &str)] = &[
    ("true", "false"),
    ("increase", "decrease"),
    ("increased", "decreased"),
    ("increasing", "decreasing"),
    ("rise", "fall"),
    ("rose", "fell"),
    ("higher", "lower"),
    ("more", "less"),
    ("growth", "decline"),
    ("confirmed", "denied"),
    ("confirms", "denies"),
    ("support", "oppose"),
    ("supports", "opposes"),
    ("safe", "unsafe"),
    ("effective", "ineffective"),
    ("proven", "disproven"),
    ("accurate", "inaccurate"),
    ("legal", "illegal"),
];

/// Detects contradictions between the evidence of a round's arguments
#[derive(Debug, Clone, Default)]
pub struct ConflictDetector;

impl ConflictDetector {
    pub fn new() -> Self {
        Self
    }

    /// All conflicts among the given arguments, in a stable order
    pub fn detect(&self, arguments: &[Argument]) -> Vec<EvidenceConflict> {
        let mut conflicts = self.source_disagreements(arguments);
        conflicts.extend(self.temporal_discrepancies(arguments));
        conflicts.extend(self.methodology_differences(arguments));
        conflicts.extend(self.interpretation_variances(arguments));

        for conflict in &conflicts {
            metrics::counter!("verity_conflicts_detected_total", "type" => conflict.conflict_type.as_str())
                .increment(1);
        }
        conflicts
    }

    /// Whether two texts contain a contradictory keyword pair
    pub fn contradicts(&self, a: &str, b: &str) -> bool {
        let (wa, wb) = (tokens(a), tokens(b));
        CONTRADICTIONS.iter().any(|(x, y)| {
            (wa.contains(*x) && wb.contains(*y)) || (wa.contains(*y) && wb.contains(*x))
        })
    }

    /// Supporting vs refuting evidence that shares a URL with differing
    /// content, or shares a source type/domain with contradictory wording
    pub fn source_disagreements(&self, arguments: &[Argument]) -> Vec<EvidenceConflict> {
        let mut conflicts = Vec::new();
        let mut seen = HashSet::new();

        for (supporter, refuter) in opposing_pairs(arguments) {
            for es in &supporter.evidence {
                for er in &refuter.evidence {
                    let same_url = es.source_url == er.source_url;
                    let description = if same_url {
                        if normalize(&es.content) == normalize(&er.content) {
                            continue;
                        }
                        format!("{} reports differing content to opposing agents", es.source_url)
                    } else if self.related_sources(es, er) && self.contradicts(&es.content, &er.content) {
                        format!(
                            "{} and {} make contradictory statements",
                            es.source_url, er.source_url
                        )
                    } else {
                        continue;
                    };

                    if !seen.insert(pair_key(es, er)) {
                        continue;
                    }
                    conflicts.push(EvidenceConflict::new(
                        ConflictType::SourceDisagreement,
                        [supporter.agent_type, refuter.agent_type],
                        vec![es.clone(), er.clone()],
                        description,
                    ));
                }
            }
        }
        conflicts
    }

    /// Contradictory evidence from at least two agents within one calendar quarter
    pub fn temporal_discrepancies(&self, arguments: &[Argument]) -> Vec<EvidenceConflict> {
        let mut buckets: BTreeMap<(i32, u32), Vec<(AgentType, &EvidenceRef)>> = BTreeMap::new();
        for arg in arguments {
            for evidence in &arg.evidence {
                if let Some(quarter) = evidence.quarter() {
                    buckets.entry(quarter).or_default().push((arg.agent_type, evidence));
                }
            }
        }

        let mut conflicts = Vec::new();
        for ((year, quarter), entries) in buckets {
            let agents: BTreeSet<AgentType> = entries.iter().map(|(a, _)| *a).collect();
            if agents.len() < 2 {
                continue;
            }

            let mut involved_agents = BTreeSet::new();
            let mut involved = Vec::new();
            let mut seen = HashSet::new();
            for (i, (agent_a, ea)) in entries.iter().enumerate() {
                for (agent_b, eb) in entries.iter().skip(i + 1) {
                    if agent_a == agent_b || !self.conflicting_content(ea, eb) {
                        continue;
                    }
                    involved_agents.insert(*agent_a);
                    involved_agents.insert(*agent_b);
                    for e in [*ea, *eb] {
                        if seen.insert(e.fingerprint()) {
                            involved.push(e.clone());
                        }
                    }
                }
            }

            if !involved.is_empty() {
                conflicts.push(EvidenceConflict::new(
                    ConflictType::TemporalDiscrepancy,
                    involved_agents,
                    involved,
                    format!("Contradictory evidence published in {year} Q{quarter}"),
                ));
            }
        }
        conflicts
    }

    /// Opposing agents whose evidence relies on disjoint methodology groups
    pub fn methodology_differences(&self, arguments: &[Argument]) -> Vec<EvidenceConflict> {
        let mut conflicts = Vec::new();
        let mut seen = HashSet::new();

        for (supporter, refuter) in opposing_pairs(arguments) {
            let groups_s = methodology_groups(&supporter.evidence);
            let groups_r = methodology_groups(&refuter.evidence);
            if groups_s.is_empty() || groups_r.is_empty() || !groups_s.is_disjoint(&groups_r) {
                continue;
            }
            if !seen.insert((supporter.agent_type, refuter.agent_type)) {
                continue;
            }

            let mut fingerprints = HashSet::new();
            let evidence: Vec<EvidenceRef> = supporter
                .evidence
                .iter()
                .chain(refuter.evidence.iter())
                .filter(|e| fingerprints.insert(e.fingerprint()))
                .cloned()
                .collect();

            conflicts.push(EvidenceConflict::new(
                ConflictType::MethodologyDifference,
                [supporter.agent_type, refuter.agent_type],
                evidence,
                format!(
                    "{} relies on {} while {} relies on {}",
                    supporter.agent_type,
                    join_groups(&groups_s),
                    refuter.agent_type,
                    join_groups(&groups_r)
                ),
            ));
        }
        conflicts
    }

    /// The same evidence item cited by both a supporting and a refuting agent
    pub fn interpretation_variances(&self, arguments: &[Argument]) -> Vec<EvidenceConflict> {
        let mut cited: HashMap<String, (EvidenceRef, BTreeSet<Position>, BTreeSet<AgentType>)> =
            HashMap::new();
        let mut order = Vec::new();

        for arg in arguments.iter().filter(|a| !a.position.is_neutral()) {
            for evidence in &arg.evidence {
                let fp = evidence.fingerprint();
                let entry = cited.entry(fp.clone()).or_insert_with(|| {
                    order.push(fp);
                    (evidence.clone(), BTreeSet::new(), BTreeSet::new())
                });
                entry.1.insert(arg.position);
                entry.2.insert(arg.agent_type);
            }
        }

        order
            .into_iter()
            .filter_map(|fp| cited.remove(&fp))
            .filter(|(_, positions, _)| positions.len() > 1)
            .map(|(evidence, _, agents)| {
                let description = format!(
                    "{} is cited both for and against the claim",
                    evidence.source_url
                );
                EvidenceConflict::new(
                    ConflictType::InterpretationVariance,
                    agents,
                    vec![evidence],
                    description,
                )
            })
            .collect()
    }

    fn related_sources(&self, a: &Evidence, b: &Evidence) -> bool {
        if a.source_type == b.source_type {
            return true;
        }
        matches!((a.domain(), b.domain()), (Some(da), Some(db)) if da == db)
    }

    fn conflicting_content(&self, a: &Evidence, b: &Evidence) -> bool {
        if a.source_url == b.source_url {
            normalize(&a.content) != normalize(&b.content)
        } else {
            self.contradicts(&a.content, &b.content)
        }
    }
}

fn opposing_pairs(arguments: &[Argument]) -> impl Iterator<Item = (&Argument, &Argument)> {
    arguments
        .iter()
        .filter(|a| a.position == Position::Supports)
        .flat_map(move |s| {
            arguments
                .iter()
                .filter(|a| a.position == Position::Refutes)
                .map(move |r| (s, r))
        })
}

fn methodology_groups(evidence: &[EvidenceRef]) -> BTreeSet<MethodologyGroup> {
    evidence
        .iter()
        .map(|e| MethodologyGroup::detect(&e.content))
        .filter(|g| *g != MethodologyGroup::General)
        .collect()
}

fn join_groups(groups: &BTreeSet<MethodologyGroup>) -> String {
    groups.iter().map(|g| g.as_str()).collect::<Vec<_>>().join("/")
}

fn pair_key(a: &Evidence, b: &Evidence) -> (String, String) {
    let (fa, fb) = (a.fingerprint(), b.fingerprint());
    if fa <= fb {
        (fa, fb)
    } else {
        (fb, fa)
    }
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
