// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use http::Response;

use crate::define_fn_wrapper::define_fn_wrapper;
use crate::{OnRetryArgs, ShouldRetryArgs};

define_fn_wrapper!(ShouldRetry<RB, E>(Fn(result: &Result<Response<RB>, E>, args: ShouldRetryArgs<'_>) -> bool));
define_fn_wrapper!(OnRetry<RB, E>(Fn(args: OnRetryArgs<'_, RB, E>)));
