use std::panic::AssertUnwindSafe;
use zeolite::errors::ZeoliteResult;
use zeolite::Database;

/// A freshly opened database and its registry name, handed to each test.
#[derive(Clone)]
pub struct TestContext {
    name: String,
    db: Database,
}

impl TestContext {
    pub fn new(name: String, db: Database) -> Self {
        Self { name, db }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn db(&self) -> Database {
        self.db.clone()
    }

    /// A second handle on the same database name, sharing stored state
    /// with [`db`](TestContext::db).
    pub fn open_sibling(&self) -> ZeoliteResult<Database> {
        Database::open(&self.name)
    }
}

pub fn random_name() -> String {
    format!("zeolite-test-{}", uuid::Uuid::new_v4().simple())
}

pub fn create_test_context() -> ZeoliteResult<TestContext> {
    let name = random_name();
    let db = Database::open(&name)?;
    Ok(TestContext::new(name, db))
}

/// Erases the test database so later opens of the same name start empty.
pub fn cleanup(ctx: TestContext) -> ZeoliteResult<()> {
    ctx.db().delete()
}

/// Runs a test with guaranteed cleanup: `after` runs whether the test
/// passes, fails, or panics.
pub fn run_test<B, T, A>(before: B, test: T, after: A)
where
    B: FnOnce() -> ZeoliteResult<TestContext>,
    T: FnOnce(TestContext) -> ZeoliteResult<()>,
    A: FnOnce(TestContext) -> ZeoliteResult<()>,
{
    let ctx = before().expect("Before run failed");
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| test(ctx.clone())));
    let after_result = after(ctx);

    match result {
        Ok(Ok(())) => after_result.expect("After run failed"),
        Ok(Err(e)) => panic!("Test failed: {:?}", e),
        Err(panic_err) => std::panic::resume_unwind(panic_err),
    }
}
