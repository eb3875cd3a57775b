pub mod answer;
pub mod input;
pub mod loaders;
pub mod pipeline_item;
pub mod report;

pub use answer::{
    AnswerSet, Dimension, DimensionScore, ExtractedAnswer, GradingResult, StandardAnswer,
    WrongAnswer,
};
pub use input::BatchInput;
pub use loaders::{load_answer_set, load_batch_inputs};
pub use pipeline_item::{ItemResult, ItemStatus, PipelineItem, Stage, PROGRESS_STARTED};
pub use report::{
    AbilityData, AnalysisData, AnalysisResult, KnowledgePoint, LearningPath, OcrResult,
    PathStage, ReportData, ReportStatistics, ScoreData, StoredReport,
};
