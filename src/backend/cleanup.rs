// Release helpers for multi-step object creation
//
// When a later step fails, whatever the earlier steps created has to be
// destroyed before the error is returned.

/// Pass `result` through, running `release` first when it is an error
pub fn release_on_err<T, E>(result: Result<T, E>, release: impl FnOnce()) -> Result<T, E> {
    if result.is_err() {
        release();
    }
    result
}

/// Hand `resource` back if `step` succeeded, otherwise give it to `release`
pub fn keep_or_release<R, E>(
    step: Result<(), E>,
    resource: R,
    release: impl FnOnce(R),
) -> Result<R, E> {
    match step {
        Ok(()) => Ok(resource),
        Err(e) => {
            release(resource);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn test_release_skipped_on_success() {
        let mut released = false;
        let value = release_on_err(Ok::<_, vk::Result>(7), || released = true).unwrap();
        assert_eq!(value, 7);
        assert!(!released);
    }

    #[test]
    fn test_release_runs_on_failure() {
        let mut released = false;
        let result = release_on_err(
            Err::<u32, _>(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            || released = true,
        );
        assert_eq!(result, Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
        assert!(released);
    }

    #[test]
    fn test_bound_resource_is_kept() {
        let mut released = Vec::new();
        let kept = keep_or_release(Ok::<(), vk::Result>(()), "allocation", |r| released.push(r));
        assert_eq!(kept, Ok("allocation"));
        assert!(released.is_empty());
    }

    #[test]
    fn test_failed_bind_releases_resource() {
        let mut released = Vec::new();
        let kept = keep_or_release(
            Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            "allocation",
            |r| released.push(r),
        );
        assert_eq!(kept, Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
        assert_eq!(released, vec!["allocation"]);
    }
}
