use futures::future::BoxFuture;
use shakmaty::uci::UciMove;
use tokio::sync::watch;
use uci_engine::{EngineChannel, EngineError, EvaluationSample};

/// The automated opponent as seen by the session driver.
pub trait Opponent: Send + 'static {
    fn configure_strength(&self, target_rating: u32);

    fn new_game(&self);

    fn start_continuous_analysis(&self, fen: &str);

    /// Issued immediately; the future only waits for the answer.
    fn request_best_move(&self, fen: &str) -> BoxFuture<'static, Result<UciMove, EngineError>>;

    fn stop(&self);

    fn subscribe(&self) -> watch::Receiver<Option<EvaluationSample>>;
}

impl Opponent for EngineChannel {
    fn configure_strength(&self, target_rating: u32) {
        EngineChannel::configure_strength(self, target_rating)
    }

    fn new_game(&self) {
        EngineChannel::new_game(self)
    }

    fn start_continuous_analysis(&self, fen: &str) {
        EngineChannel::start_continuous_analysis(self, fen)
    }

    fn request_best_move(&self, fen: &str) -> BoxFuture<'static, Result<UciMove, EngineError>> {
        Box::pin(EngineChannel::request_best_move(self, fen))
    }

    fn stop(&self) {
        EngineChannel::stop(self)
    }

    fn subscribe(&self) -> watch::Receiver<Option<EvaluationSample>> {
        EngineChannel::subscribe(self)
    }
}
