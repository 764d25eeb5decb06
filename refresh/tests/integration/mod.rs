mod cleanup_test;
mod orchestrator_test;
mod runner_test;
