mod runner_test;
