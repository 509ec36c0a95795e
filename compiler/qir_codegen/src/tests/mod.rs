//! Whole-program tests: small compilations lowered through both phases.


mod program_tests;
