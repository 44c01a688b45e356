/// Canned phrase-to-SQL answers checked before the model pipeline.
#[derive(Debug, Clone)]
pub struct DirectSqlShortcuts {
    entries: Vec<(String, String)>,
}

impl Default for DirectSqlShortcuts {
    fn default() -> Self {
        let count_centres = "SELECT COUNT(DISTINCT center) AS total_centers FROM students";
        let list_centres = "SELECT DISTINCT center FROM students ORDER BY center";
        let count_students = "SELECT COUNT(*) AS total_students FROM students";

        Self::new([
            ("total centres", count_centres),
            ("total branches", count_centres),
            ("how many centres", count_centres),
            ("how many branches", count_centres),
            ("list centres", list_centres),
            ("all centres", list_centres),
            ("list branches", list_centres),
            ("count students", count_students),
            ("total students", count_students),
            (
                "centers with outstanding",
                "SELECT center, COUNT(*) AS student_count, SUM(outstanding) AS total_outstanding \
                 FROM students WHERE outstanding > 0 GROUP BY center \
                 ORDER BY total_outstanding DESC",
            ),
        ])
    }
}

impl DirectSqlShortcuts {
    /// Entries are matched in the given order.
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(phrase, sql)| (phrase.into().to_lowercase(), sql.into()))
                .collect(),
        }
    }

    /// First entry whose phrase occurs in the lowercased question.
    pub fn lookup(&self, question: &str) -> Option<(&str, &str)> {
        let question = question.to_lowercase();
        self.entries
            .iter()
            .find(|(phrase, _)| question.contains(phrase.as_str()))
            .map(|(phrase, sql)| (phrase.as_str(), sql.as_str()))
    }
}
