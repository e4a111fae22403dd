use crate::domain::RunConfig;
use crate::goals::Goal;

const PREAMBLE: &str = "You are an autonomous software agent working inside a project directory. \
Use the provided tools to inspect files, make changes and run commands. After each round of \
tool calls your progress is checked against the goal and the result is reported back to you. \
When you believe the goal is met, reply without requesting any tools.";

/// System entry for a new run: preamble, project directory, budget and the
/// goal's own guidance
pub fn build_system_prompt(goal: &dyn Goal, config: &RunConfig) -> String {
    format!(
        "{}\n\nProject directory: {}\nIteration budget: {}\n\n## Goal: {}\n{}",
        PREAMBLE,
        config.cwd.display(),
        config.max_iterations,
        goal.name(),
        goal.prompt_fragment(&config.cwd)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goals::CommandGoal;

    #[test]
    fn test_system_prompt_contents() {
        let goal = CommandGoal::new("shell", "make check").with_prompt("Make the checks pass.");
        let config = RunConfig::new("shell", "/work/project").with_max_iterations(7);

        let prompt = build_system_prompt(&goal, &config);
        assert!(prompt.contains("Project directory: /work/project"));
        assert!(prompt.contains("Iteration budget: 7"));
        assert!(prompt.contains("## Goal: shell"));
        assert!(prompt.contains("Make the checks pass."));
    }
}
